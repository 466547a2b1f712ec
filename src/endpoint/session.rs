//! Line-oriented connection session handed to stages.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;

use crate::net::connection::ConnectionId;

/// Longest line a stage will read, in bytes, terminator included.
pub const MAX_LINE_LEN: u64 = 1024;

/// Why a line was rejected. Carried inside an `InvalidData` I/O error.
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line exceeds {} bytes", MAX_LINE_LEN)]
    TooLong,

    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

impl From<LineError> for io::Error {
    fn from(err: LineError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One accepted connection as seen by the stage chain.
pub struct Session {
    id: ConnectionId,
    peer_addr: SocketAddr,
    endpoint: Arc<str>,
    reader: BufReader<BoxReader>,
    writer: BoxWriter,
}

impl Session {
    pub fn new<R, W>(
        id: ConnectionId,
        peer_addr: SocketAddr,
        endpoint: Arc<str>,
        reader: R,
        writer: W,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer_addr,
            endpoint,
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
        }
    }

    pub fn from_tcp(
        id: ConnectionId,
        peer_addr: SocketAddr,
        endpoint: Arc<str>,
        stream: TcpStream,
    ) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(id, peer_addr, endpoint, reader, writer)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Name of the endpoint that accepted this session.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Write `text` as is and flush.
    pub async fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Write `line` followed by a newline and flush.
    pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Read one line without its terminator. `None` on EOF.
    ///
    /// A line longer than [`MAX_LINE_LEN`] or not valid UTF-8 is consumed in
    /// full and rejected with an `InvalidData` error wrapping [`LineError`],
    /// so the next call starts at the following line.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') && n as u64 == MAX_LINE_LEN {
            self.skip_line().await?;
            return Err(LineError::TooLong.into());
        }

        let line = String::from_utf8(buf).map_err(|_| LineError::InvalidUtf8)?;
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Discard input up to and including the next newline, or to EOF.
    async fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    /// Splice the session onto `target` until both directions finish.
    ///
    /// Returns the bytes copied (client to target, target to client).
    pub async fn bridge(&mut self, target: TcpStream) -> io::Result<(u64, u64)> {
        let (mut target_reader, mut target_writer) = target.into_split();
        let reader = &mut self.reader;
        let writer = &mut self.writer;

        let upstream = async {
            let n = tokio::io::copy(reader, &mut target_writer).await?;
            target_writer.shutdown().await?;
            Ok::<_, io::Error>(n)
        };
        let downstream = async {
            let n = tokio::io::copy(&mut target_reader, writer).await?;
            writer.shutdown().await?;
            Ok::<_, io::Error>(n)
        };
        tokio::try_join!(upstream, downstream)
    }

    /// Flush and shut down the write half.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}
