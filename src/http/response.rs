//! Response handling.
//!
//! # Responsibilities
//! - Provide the synthetic responses the proxy emits on its own
//! - Peek at a backend response's status code for logging
//!
//! # Design Decisions
//! - Backend responses are relayed byte for byte; nothing here rewrites them
//! - Synthetic responses are a bare status line with an empty body

use crate::http::framing::final_status;

/// Responses generated by the proxy instead of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticResponse {
    /// No backend is currently selectable.
    ServiceUnavailable,
    /// The chosen backend failed to connect, accept the request, or answer in time.
    GatewayTimeout,
}

impl SyntheticResponse {
    pub fn status(&self) -> u16 {
        match self {
            SyntheticResponse::ServiceUnavailable => 503,
            SyntheticResponse::GatewayTimeout => 504,
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            SyntheticResponse::ServiceUnavailable => {
                b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            }
            SyntheticResponse::GatewayTimeout => {
                b"HTTP/1.1 504 Gateway Timeout\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            }
        }
    }
}

/// Status code of an HTTP/1.x response, if the head parses.
///
/// Interim 1xx heads are skipped so the final status is reported.
pub fn status_code(raw: &[u8]) -> Option<u16> {
    final_status(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_statuses_are_distinct() {
        let unavailable = SyntheticResponse::ServiceUnavailable;
        let timeout = SyntheticResponse::GatewayTimeout;

        assert_eq!(status_code(unavailable.as_bytes()), Some(unavailable.status()));
        assert_eq!(status_code(timeout.as_bytes()), Some(timeout.status()));
        assert_ne!(unavailable.status(), timeout.status());
    }

    #[test]
    fn status_of_backend_response() {
        assert_eq!(status_code(b"HTTP/1.1 418 I'm a teapot\r\n\r\n"), Some(418));
        assert_eq!(status_code(b"garbage"), None);
    }

    #[test]
    fn interim_status_is_skipped() {
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(status_code(raw), Some(201));
        assert_eq!(status_code(b"HTTP/1.1 100 Continue\r\n\r\n"), None);
    }
}
