use super::types::{Request, Response};
use std::path::Path;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed before a response arrived")]
    Closed,

    #[error("Unreadable frame: {0}")]
    Frame(String),
}

/// Longest accepted line, newline excluded.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// One newline-delimited frame read off a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A complete line that is not UTF-8. The stream stays in sync.
    Invalid(String),
    /// More than the limit arrived without a newline. The rest of the line
    /// is unread, so the stream cannot be trusted afterwards.
    Oversized,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Unix socket transport for IPC communication.
pub struct UnixSocketTransport {
    socket_path: String,
}

impl UnixSocketTransport {
    pub fn new(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Binds to the Unix socket and returns a listener.
    pub async fn bind(&self) -> Result<UnixListener> {
        if Path::new(&self.socket_path).exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, perms)?;
        }

        Ok(listener)
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Cleans up the socket file.
    pub fn cleanup(&self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Reads the next non-blank frame of at most `limit` bytes, or `None` at end
/// of stream.
pub async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    limit: usize,
) -> Result<Option<Frame>> {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut *reader)
            .take(limit as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if buf.len() > limit && buf.last() != Some(&b'\n') {
            return Ok(Some(Frame::Oversized));
        }

        match String::from_utf8(buf) {
            Ok(line) if line.trim().is_empty() => buf = line.into_bytes(),
            Ok(line) => return Ok(Some(Frame::Line(line))),
            Err(e) => {
                return Ok(Some(Frame::Invalid(format!(
                    "Request is not valid UTF-8: {}",
                    e.utf8_error()
                ))))
            }
        }
    }
}

/// Reads the next non-blank line, or `None` at end of stream.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    match read_frame(reader, MAX_LINE_BYTES).await? {
        None => Ok(None),
        Some(Frame::Line(line)) => Ok(Some(line)),
        Some(Frame::Invalid(reason)) => Err(TransportError::Frame(reason)),
        Some(Frame::Oversized) => Err(TransportError::Frame(format!(
            "line exceeds {} bytes",
            MAX_LINE_BYTES
        ))),
    }
}

/// Writes one JSON value followed by a newline.
pub async fn write_json<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let json = serde_json::to_string(value)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Client side of the protocol: one connection, any number of requests.
pub struct Client {
    reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    writer: tokio::net::unix::OwnedWriteHalf,
}

impl Client {
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    pub async fn send(&mut self, request: &Request) -> Result<Response> {
        write_json(&mut self.writer, request).await?;
        let line = read_line(&mut self.reader)
            .await?
            .ok_or(TransportError::Closed)?;
        Ok(serde_json::from_str(&line)?)
    }
}
