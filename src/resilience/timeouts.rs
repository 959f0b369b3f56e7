//! Timeout enforcement for backend I/O.
//!
//! # Responsibilities
//! - Wrap each backend step (connect, forward, read) with its own deadline
//! - Report failures as explicit error kinds instead of unwinding
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the timed-out future drops
//!   the socket operation with it
//! - Timeout errors are distinct from other errors
//! - Every error here becomes a 504 and a health failure upstream

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use crate::http::framing::{read_message, Message, MessageKind};

/// The forwarding step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStage {
    Connect,
    Forward,
    Response,
}

impl BackendStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendStage::Connect => "connect",
            BackendStage::Forward => "forward",
            BackendStage::Response => "response",
        }
    }
}

/// Failure talking to a backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("request write timed out after {0:?}")]
    ForwardTimeout(Duration),

    #[error("request write failed: {0}")]
    Forward(#[source] std::io::Error),

    #[error("no response within {0:?}")]
    ResponseTimeout(Duration),

    #[error("response read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("backend closed the connection without responding")]
    EmptyResponse,
}

impl BackendError {
    pub fn stage(&self) -> BackendStage {
        match self {
            BackendError::ConnectTimeout(_) | BackendError::Connect(_) => BackendStage::Connect,
            BackendError::ForwardTimeout(_) | BackendError::Forward(_) => BackendStage::Forward,
            BackendError::ResponseTimeout(_) | BackendError::Read(_) | BackendError::EmptyResponse => {
                BackendStage::Response
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BackendError::ConnectTimeout(_) | BackendError::ForwardTimeout(_) | BackendError::ResponseTimeout(_)
        )
    }
}

/// Open a TCP connection to `host:port` within `limit`.
///
/// Name resolution counts against the same budget.
pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream, BackendError> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            // Small request/response exchanges; don't wait on Nagle.
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(e)) => Err(BackendError::Connect(e)),
        Err(_) => Err(BackendError::ConnectTimeout(limit)),
    }
}

/// Write `payload` verbatim and flush within `limit`.
pub async fn forward<S>(stream: &mut S, payload: &[u8], limit: Duration) -> Result<(), BackendError>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let write = async {
        stream.write_all(payload).await?;
        stream.flush().await
    };
    match timeout(limit, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BackendError::Forward(e)),
        Err(_) => Err(BackendError::ForwardTimeout(limit)),
    }
}

/// Read one response within `limit`. Zero bytes before EOF is a failure.
pub async fn read_response<S>(
    stream: &mut S,
    limit: Duration,
    max_bytes: usize,
    head_request: bool,
) -> Result<Message, BackendError>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let read = read_message(stream, MessageKind::Response { head_request }, max_bytes);
    match timeout(limit, read).await {
        Ok(Ok(message)) if message.bytes.is_empty() => Err(BackendError::EmptyResponse),
        Ok(Ok(message)) => Ok(message),
        Ok(Err(e)) => Err(BackendError::Read(e)),
        Err(_) => Err(BackendError::ResponseTimeout(limit)),
    }
}
