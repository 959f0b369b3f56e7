//! Request acquisition.
//!
//! # Responsibilities
//! - Read the raw client request within the client-read budget
//! - Offer an optional parsed view (method, path, headers) for logging
//!
//! # Design Decisions
//! - The raw bytes are what gets forwarded; the parsed view is never used to
//!   rebuild the request
//! - Header lookup is case-insensitive, duplicates are kept in arrival order

use std::future::Future;
use std::time::Duration;
use bytes::Bytes;
use tokio::io::AsyncRead;
use crate::http::framing::{read_message, MessageEnd, MessageKind};

const MAX_HEADERS: usize = 64;

/// Failure to obtain a request from the client.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("client sent no complete request within {0:?}")]
    Timeout(Duration),

    #[error("client closed the connection before sending a request")]
    Closed,

    #[error("client read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw request payload as received from the client.
#[derive(Debug, Clone)]
pub struct RawRequest {
    bytes: Bytes,
    truncated: bool,
}

impl RawRequest {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            truncated: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when reading stopped at the size cap.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Parse the request head, if the payload is HTTP/1.x.
    pub fn head(&self) -> Option<RequestHead> {
        RequestHead::parse(&self.bytes)
    }
}

/// Parsed view of an HTTP/1.x request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// Header (name, value) pairs in original order.
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse the head from raw bytes. Returns None unless the head is complete.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(raw) {
            Ok(httparse::Status::Complete(_)) => {}
            _ => return None,
        }

        Some(Self {
            method: req.method?.to_string(),
            path: req.path?.to_string(),
            headers: req
                .headers
                .iter()
                .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
                .collect(),
        })
    }

    /// First value for `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in arrival order.
    pub fn header_all<'a>(&'a self, name: &str) -> Vec<&'a str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_head(&self) -> bool {
        self.method.eq_ignore_ascii_case("HEAD")
    }
}

/// Source of raw request payloads.
pub trait RequestReader: Send + Sync {
    /// Read one request from `stream` within `timeout`.
    fn read_request<S>(
        &self,
        stream: &mut S,
        timeout: Duration,
    ) -> impl Future<Output = Result<RawRequest, ReadError>> + Send
    where
        S: AsyncRead + Unpin + Send;
}

/// Reads a single buffered HTTP/1.x request, or any opaque payload.
#[derive(Debug, Clone)]
pub struct HttpRequestReader {
    max_bytes: usize,
}

impl HttpRequestReader {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl RequestReader for HttpRequestReader {
    async fn read_request<S>(&self, stream: &mut S, timeout: Duration) -> Result<RawRequest, ReadError>
    where
        S: AsyncRead + Unpin + Send,
    {
        let message = tokio::time::timeout(timeout, read_message(stream, MessageKind::Request, self.max_bytes))
            .await
            .map_err(|_| ReadError::Timeout(timeout))??;

        if message.bytes.is_empty() {
            return Err(ReadError::Closed);
        }

        let truncated = message.end == MessageEnd::LimitReached;
        if truncated {
            tracing::warn!(max_bytes = self.max_bytes, "Request reached size cap, forwarding truncated payload");
        }

        Ok(RawRequest {
            bytes: message.bytes,
            truncated,
        })
    }
}
