//! Incremental HTTP/1.x Request Decoder
//!
//! This module turns a growing byte buffer into [`HttpPart`]s. The request
//! line and headers are parsed with `httparse`; the body is framed here,
//! either by `Content-Length` or by chunked transfer-encoding.
//!
//! ## How the Decoder Works
//!
//! [`RequestDecoder::decode`] is called with the connection's read buffer and
//! returns either:
//! - `Ok(Some(part))` - a part was decoded and its bytes removed from the buffer
//! - `Ok(None)` - more data is needed
//! - `Err(ParseError)` - the stream is malformed and cannot be trusted
//!
//! Body bytes are handed out as soon as they arrive, so the decoder never
//! holds a whole body; size limits are enforced by the aggregator.
//!
//! ```text
//!            ┌──────┐  head   ┌────────┐ last byte ┌──────┐
//!  bytes ───>│ Head │────────>│ Length │──────────>│ Done │──> End
//!            └──────┘         └────────┘           └──────┘
//!                │ chunked    ┌───────────┐ size 0 ┌──────────┐
//!                └───────────>│ ChunkSize │───────>│ Trailers │──> End
//!                             └───────────┘        └──────────┘
//!                               ▲       │ size n
//!                               │       ▼
//!                        ┌──────────┐ ┌───────────┐
//!                        │ ChunkEnd │<│ ChunkData │
//!                        └──────────┘ └───────────┘
//! ```

use crate::protocol::types::{header, BodyFraming, HttpPart, RequestHead, Version, CRLF};
use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Errors that make an inbound request undecodable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The request line or a header is malformed
    #[error("invalid request head: {0}")]
    InvalidHead(String),

    /// Too many header lines
    #[error("too many headers (max: {0})")]
    TooManyHeaders(usize),

    /// Request line and headers exceed the head size limit
    #[error("request head too large (max: {0} bytes)")]
    HeadTooLarge(usize),

    /// A header value is not valid UTF-8
    #[error("invalid value for header '{0}'")]
    InvalidHeaderValue(String),

    /// Only HTTP/1.0 and HTTP/1.1 are spoken here
    #[error("unsupported HTTP version: {0}")]
    UnsupportedVersion(u8),

    /// Content-Length missing a number or conflicting with itself
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// Transfer-Encoding other than chunked
    #[error("unsupported transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// Malformed chunk size line or chunk terminator
    #[error("invalid chunked body: {0}")]
    InvalidChunk(String),
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size of the request line plus headers (16 KB)
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Maximum number of header lines in one request
pub const MAX_HEADERS: usize = 64;

/// Maximum length of a chunk size or trailer line
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Waiting for a request line
    Head,
    /// Inside a length-delimited body
    Length { remaining: u64 },
    /// Waiting for a chunk size line
    ChunkSize,
    /// Inside a chunk
    ChunkData { remaining: u64 },
    /// Waiting for the CRLF that closes a chunk
    ChunkEnd,
    /// Skipping trailer lines after the last chunk
    Trailers,
    /// Body complete; `End` not yet emitted
    Done,
}

/// A streaming HTTP/1.x request decoder.
///
/// One decoder lives for the whole connection and is reused for every
/// pipelined request on it.
///
/// # Example
///
/// ```
/// use apiserver::protocol::{HttpPart, RequestDecoder};
/// use bytes::BytesMut;
///
/// let mut decoder = RequestDecoder::new();
/// let mut buffer = BytesMut::from(&b"GET /users HTTP/1.1\r\nemail: a@b.c\r\n\r\n"[..]);
///
/// assert!(matches!(decoder.decode(&mut buffer), Ok(Some(HttpPart::Head(_)))));
/// assert!(matches!(decoder.decode(&mut buffer), Ok(Some(HttpPart::End))));
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug)]
pub struct RequestDecoder {
    state: DecodeState,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Head,
        }
    }

    /// Returns true between requests, when no partial request is pending.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Head
    }

    /// Drops any partially decoded request.
    pub fn reset(&mut self) {
        self.state = DecodeState::Head;
    }

    /// Decodes the next part from `buf`, consuming the bytes it used.
    pub fn decode(&mut self, buf: &mut BytesMut) -> ParseResult<Option<HttpPart>> {
        loop {
            match self.state {
                DecodeState::Head => return self.decode_head(buf),

                DecodeState::Length { remaining } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let n = (remaining as usize).min(buf.len());
                    let left = remaining - n as u64;
                    self.state = if left == 0 {
                        DecodeState::Done
                    } else {
                        DecodeState::Length { remaining: left }
                    };
                    return Ok(Some(HttpPart::Body(buf.split_to(n).freeze())));
                }

                DecodeState::ChunkSize => {
                    let pos = match find_crlf(buf) {
                        Some(pos) => pos,
                        None if buf.len() > MAX_CHUNK_LINE => {
                            return Err(ParseError::InvalidChunk(
                                "chunk size line too long".to_string(),
                            ))
                        }
                        None => return Ok(None),
                    };
                    let size = parse_chunk_size(&buf[..pos])?;
                    buf.advance(pos + CRLF.len());
                    self.state = if size == 0 {
                        DecodeState::Trailers
                    } else {
                        DecodeState::ChunkData { remaining: size }
                    };
                }

                DecodeState::ChunkData { remaining } => {
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    let n = (remaining as usize).min(buf.len());
                    let left = remaining - n as u64;
                    self.state = if left == 0 {
                        DecodeState::ChunkEnd
                    } else {
                        DecodeState::ChunkData { remaining: left }
                    };
                    return Ok(Some(HttpPart::Body(buf.split_to(n).freeze())));
                }

                DecodeState::ChunkEnd => {
                    if buf.len() < CRLF.len() {
                        return Ok(None);
                    }
                    if &buf[..CRLF.len()] != CRLF {
                        return Err(ParseError::InvalidChunk(
                            "chunk data not followed by CRLF".to_string(),
                        ));
                    }
                    buf.advance(CRLF.len());
                    self.state = DecodeState::ChunkSize;
                }

                DecodeState::Trailers => {
                    let pos = match find_crlf(buf) {
                        Some(pos) => pos,
                        None if buf.len() > MAX_CHUNK_LINE => {
                            return Err(ParseError::InvalidChunk(
                                "trailer line too long".to_string(),
                            ))
                        }
                        None => return Ok(None),
                    };
                    buf.advance(pos + CRLF.len());
                    if pos == 0 {
                        self.state = DecodeState::Head;
                        return Ok(Some(HttpPart::End));
                    }
                }

                DecodeState::Done => {
                    self.state = DecodeState::Head;
                    return Ok(Some(HttpPart::End));
                }
            }
        }
    }

    fn decode_head(&mut self, buf: &mut BytesMut) -> ParseResult<Option<HttpPart>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let consumed = match req.parse(buf) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => {
                if buf.len() > MAX_HEAD_SIZE {
                    return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
                }
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Err(ParseError::TooManyHeaders(MAX_HEADERS))
            }
            Err(e) => return Err(ParseError::InvalidHead(e.to_string())),
        };

        if consumed > MAX_HEAD_SIZE {
            return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
        }

        let method = req
            .method
            .ok_or_else(|| ParseError::InvalidHead("missing method".to_string()))?
            .to_string();
        let uri = req
            .path
            .ok_or_else(|| ParseError::InvalidHead("missing request target".to_string()))?
            .to_string();
        let version = match req.version {
            Some(0) => Version::Http10,
            Some(1) => Version::Http11,
            Some(v) => return Err(ParseError::UnsupportedVersion(v)),
            None => return Err(ParseError::InvalidHead("missing version".to_string())),
        };

        let mut parsed = Vec::with_capacity(req.headers.len());
        for h in req.headers.iter() {
            let value = std::str::from_utf8(h.value)
                .map_err(|_| ParseError::InvalidHeaderValue(h.name.to_string()))?;
            parsed.push((h.name.to_ascii_lowercase(), value.trim().to_string()));
        }

        let framing = body_framing(&parsed)?;
        buf.advance(consumed);

        self.state = match framing {
            BodyFraming::Empty | BodyFraming::Length(0) => DecodeState::Done,
            BodyFraming::Length(n) => DecodeState::Length { remaining: n },
            BodyFraming::Chunked => DecodeState::ChunkSize,
        };

        Ok(Some(HttpPart::Head(RequestHead {
            method,
            uri,
            version,
            headers: parsed,
            framing,
        })))
    }
}

/// Works out how the body is delimited from the request headers.
fn body_framing(headers: &[(String, String)]) -> ParseResult<BodyFraming> {
    let codings: Vec<&str> = headers
        .iter()
        .filter(|(n, _)| n == header::TRANSFER_ENCODING)
        .flat_map(|(_, v)| v.split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    if let Some(last) = codings.last() {
        // chunked must be the final coding for a request body to be framed
        if last.eq_ignore_ascii_case("chunked") && codings.len() == 1 {
            return Ok(BodyFraming::Chunked);
        }
        return Err(ParseError::UnsupportedTransferEncoding(codings.join(", ")));
    }

    let mut length: Option<u64> = None;
    for (_, value) in headers.iter().filter(|(n, _)| n == header::CONTENT_LENGTH) {
        for item in value.split(',') {
            let n: u64 = item
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength(value.clone()))?;
            match length {
                Some(prev) if prev != n => {
                    return Err(ParseError::InvalidContentLength(value.clone()))
                }
                _ => length = Some(n),
            }
        }
    }

    Ok(match length {
        Some(n) => BodyFraming::Length(n),
        None => BodyFraming::Empty,
    })
}

/// Parses `1a;ext=val` into 26.
fn parse_chunk_size(line: &[u8]) -> ParseResult<u64> {
    let line = std::str::from_utf8(line)
        .map_err(|_| ParseError::InvalidChunk("non-ASCII chunk size".to_string()))?;
    let hex = line.split(';').next().unwrap_or("").trim();
    if hex.is_empty() {
        return Err(ParseError::InvalidChunk("empty chunk size".to_string()));
    }
    u64::from_str_radix(hex, 16)
        .map_err(|_| ParseError::InvalidChunk(format!("bad chunk size '{}'", hex)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
