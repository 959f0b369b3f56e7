//! HTTP/1.x message boundaries.
//!
//! The relay never rewrites bytes; it only needs to know when a buffered
//! message is complete so that it can stop reading. Anything that does not
//! parse as HTTP is treated as complete as soon as it has been received.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEADERS: usize = 64;
const READ_CHUNK: usize = 8 * 1024;

/// Which side of the exchange is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    /// `head_request` suppresses the body of the response to a HEAD.
    Response { head_request: bool },
}

/// Completeness of a buffered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// More bytes are needed.
    Incomplete,
    /// The message ends at this offset.
    Complete(usize),
    /// No length information; the message ends when the peer closes.
    UntilClose,
}

/// How a read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEnd {
    Complete,
    Eof,
    LimitReached,
}

/// A buffered message and how reading it ended.
#[derive(Debug, Clone)]
pub struct Message {
    pub bytes: Bytes,
    pub end: MessageEnd,
}

/// Parsed fields of one message head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Head {
    /// Length of the head including the blank line.
    len: usize,
    /// Status code, for responses.
    code: Option<u16>,
    chunked: bool,
    /// `Some(None)` when the header is present but unparsable.
    content_length: Option<Option<usize>>,
}

impl Head {
    fn new(len: usize, code: Option<u16>, headers: &[httparse::Header<'_>]) -> Self {
        let chunked = headers.iter().any(|h| {
            h.name.eq_ignore_ascii_case("transfer-encoding")
                && std::str::from_utf8(h.value)
                    .map(|v| v.to_ascii_lowercase().contains("chunked"))
                    .unwrap_or(false)
        });
        let content_length = headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("content-length"))
            .map(|h| std::str::from_utf8(h.value).ok().and_then(|v| v.trim().parse::<usize>().ok()));

        Self { len, code, chunked, content_length }
    }

    /// A 1xx other than 101 is followed by another response head.
    fn is_interim(&self) -> bool {
        matches!(self.code, Some(code) if (100..200).contains(&code) && code != 101)
    }
}

/// Parse the head at the start of `buf`. `Ok(None)` means more bytes are needed.
fn parse_head(buf: &[u8], kind: MessageKind) -> Result<Option<Head>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    match parse_with(buf, kind, &mut headers) {
        Err(httparse::Error::TooManyHeaders) => {
            // Each header line ends in '\n', so this many slots always suffice.
            let lines = buf.iter().filter(|&&b| b == b'\n').count();
            let mut headers = vec![httparse::EMPTY_HEADER; lines];
            parse_with(buf, kind, &mut headers)
        }
        other => other,
    }
}

fn parse_with<'b>(
    buf: &'b [u8],
    kind: MessageKind,
    headers: &mut [httparse::Header<'b>],
) -> Result<Option<Head>, httparse::Error> {
    match kind {
        MessageKind::Request => {
            let mut req = httparse::Request::new(headers);
            Ok(match req.parse(buf)? {
                httparse::Status::Complete(len) => Some(Head::new(len, None, req.headers)),
                httparse::Status::Partial => None,
            })
        }
        MessageKind::Response { .. } => {
            let mut resp = httparse::Response::new(headers);
            Ok(match resp.parse(buf)? {
                httparse::Status::Complete(len) => Some(Head::new(len, resp.code, resp.headers)),
                httparse::Status::Partial => None,
            })
        }
    }
}

/// Status of the final response in `buf`, skipping interim 1xx heads.
pub fn final_status(buf: &[u8]) -> Option<u16> {
    let kind = MessageKind::Response { head_request: false };
    let mut start = 0;
    loop {
        let head = parse_head(&buf[start..], kind).ok()??;
        if !head.is_interim() {
            return head.code;
        }
        start += head.len;
    }
}

/// Inspect `buf` and report whether it holds a full message.
///
/// Interim 1xx responses are skipped; the message ends with the final
/// response that follows them.
pub fn inspect(buf: &[u8], kind: MessageKind) -> Framing {
    let mut start = 0;

    let head = loop {
        let head = match parse_head(&buf[start..], kind) {
            Ok(Some(head)) => head,
            Ok(None) => return Framing::Incomplete,
            Err(_) if start == 0 => return opaque(buf),
            // Garbage after an interim response; stop at what we have.
            Err(_) => return Framing::Complete(buf.len()),
        };
        if head.is_interim() {
            start += head.len;
            continue;
        }
        break head;
    };

    let head_end = start + head.len;
    let no_body = match kind {
        MessageKind::Request => false,
        MessageKind::Response { head_request } => {
            let code = head.code.unwrap_or(200);
            head_request || (100..200).contains(&code) || code == 204 || code == 304
        }
    };
    if no_body {
        return Framing::Complete(head_end);
    }

    if head.chunked {
        return chunked_end(buf, head_end);
    }

    match head.content_length {
        Some(Some(len)) => {
            let total = head_end.saturating_add(len);
            if buf.len() >= total {
                Framing::Complete(total)
            } else {
                Framing::Incomplete
            }
        }
        // Unparsable length: stop at what we have.
        Some(None) => Framing::Complete(buf.len()),
        None => match kind {
            MessageKind::Request => Framing::Complete(head_end),
            MessageKind::Response { .. } => Framing::UntilClose,
        },
    }
}

fn opaque(buf: &[u8]) -> Framing {
    if buf.is_empty() {
        Framing::Incomplete
    } else {
        Framing::Complete(buf.len())
    }
}

fn chunked_end(buf: &[u8], mut pos: usize) -> Framing {
    loop {
        match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete((consumed, 0))) => {
                pos += consumed;
                let rest = &buf[pos..];
                if rest.starts_with(b"\r\n") {
                    return Framing::Complete(pos + 2);
                }
                // Trailers end with an empty line.
                return match rest.windows(4).position(|w| w == b"\r\n\r\n") {
                    Some(i) => Framing::Complete(pos + i + 4),
                    None => Framing::Incomplete,
                };
            }
            Ok(httparse::Status::Complete((consumed, size))) => {
                let end = match usize::try_from(size)
                    .ok()
                    .and_then(|s| (pos + consumed).checked_add(s))
                    .and_then(|e| e.checked_add(2))
                {
                    Some(end) => end,
                    None => return Framing::Complete(buf.len()),
                };
                if buf.len() < end {
                    return Framing::Incomplete;
                }
                pos = end;
            }
            Ok(httparse::Status::Partial) => return Framing::Incomplete,
            Err(_) => return Framing::Complete(buf.len()),
        }
    }
}

/// Read one message from `stream`, stopping at completion, EOF, or `max_bytes`.
///
/// Every byte received is kept, including anything past the detected end.
pub async fn read_message<S>(
    stream: &mut S,
    kind: MessageKind,
    max_bytes: usize,
) -> std::io::Result<Message>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(max_bytes.min(READ_CHUNK));
    let mut chunk = [0u8; READ_CHUNK];

    let end = loop {
        let room = max_bytes.saturating_sub(buf.len());
        if room == 0 {
            break MessageEnd::LimitReached;
        }

        let n = stream.read(&mut chunk[..room.min(READ_CHUNK)]).await?;
        if n == 0 {
            break MessageEnd::Eof;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Framing::Complete(_) = inspect(&buf, kind) {
            break MessageEnd::Complete;
        }
    };

    Ok(Message {
        bytes: buf.freeze(),
        end,
    })
}
