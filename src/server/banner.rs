//! Banner stage: greets every connection with a fixed text.

use async_trait::async_trait;

use crate::endpoint::{Flow, Session, Stage};

#[derive(Debug, Clone)]
pub struct BannerStage {
    text: String,
}

impl BannerStage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Stage for BannerStage {
    fn name(&self) -> &str {
        "banner"
    }

    async fn handle(&self, session: &mut Session) -> std::io::Result<Flow> {
        for line in self.text.lines() {
            session.write_line(line).await?;
        }
        Ok(Flow::Continue)
    }
}
