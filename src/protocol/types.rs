//! HTTP/1.x Wire Types
//!
//! This module defines the values that flow between the request decoder,
//! the aggregator and the response writer.
//!
//! ## Request Framing
//!
//! A request arrives as a head followed by an optional body:
//!
//! ```text
//! POST /tokens HTTP/1.1\r\n            <- request line
//! Host: localhost:8080\r\n             <- headers
//! Content-Type: application/x-www-form-urlencoded\r\n
//! Content-Length: 27\r\n
//! \r\n                                 <- end of head
//! userNo=12312&password=secret         <- body
//! ```
//!
//! The decoder turns that byte stream into a sequence of [`HttpPart`]s:
//! one `Head`, zero or more `Body` fragments, and one `End`.

use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used by HTTP/1.x
pub const CRLF: &[u8] = b"\r\n";

/// Header names the pipeline itself interprets.
pub mod header {
    pub const CONNECTION: &str = "connection";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const CONTENT_ENCODING: &str = "content-encoding";
    pub const TRANSFER_ENCODING: &str = "transfer-encoding";
    pub const ACCEPT_ENCODING: &str = "accept-encoding";
    pub const EXPECT: &str = "expect";
}

/// HTTP protocol version of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http10 => write!(f, "HTTP/1.0"),
            Version::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

/// How the body following a request head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body at all
    Empty,
    /// `Content-Length: n`
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
}

/// The request line and headers of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Method token exactly as sent (`GET`, `POST`, ...)
    pub method: String,
    /// Request target (path and query)
    pub uri: String,
    pub version: Version,
    /// Headers in arrival order, names lowercased
    pub headers: Vec<(String, String)>,
    pub framing: BodyFraming,
}

impl RequestHead {
    /// Returns the last value of the named header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the header contains the given comma-separated token.
    fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .flat_map(|(_, v)| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Declared body length, if the body is length-delimited.
    pub fn content_length(&self) -> Option<u64> {
        match self.framing {
            BodyFraming::Length(n) => Some(n),
            _ => None,
        }
    }

    /// Whether the connection should stay open after the response.
    ///
    /// HTTP/1.1 keeps the connection alive unless `Connection: close` is sent;
    /// HTTP/1.0 closes unless `Connection: keep-alive` is sent.
    pub fn is_keep_alive(&self) -> bool {
        match self.version {
            Version::Http11 => !self.header_has_token(header::CONNECTION, "close"),
            Version::Http10 => self.header_has_token(header::CONNECTION, "keep-alive"),
        }
    }

    /// Whether the client waits for `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.version == Version::Http11
            && self
                .header(header::EXPECT)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }

    /// Whether the client accepts a gzip-encoded response body.
    pub fn accepts_gzip(&self) -> bool {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(header::ACCEPT_ENCODING))
            .flat_map(|(_, v)| v.split(','))
            .any(|coding| {
                let mut params = coding.split(';');
                let name = params.next().unwrap_or("").trim();
                let refused = params.any(|p| {
                    let p = p.trim();
                    p.strip_prefix("q=")
                        .and_then(|q| q.trim().parse::<f32>().ok())
                        .is_some_and(|q| q == 0.0)
                });
                (name.eq_ignore_ascii_case("gzip") || name == "*") && !refused
            })
    }
}

/// One decoded unit of an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpPart {
    /// Request line and headers
    Head(RequestHead),
    /// A fragment of the (de-chunked) body
    Body(Bytes),
    /// The request has been fully received
    End,
}

/// Transport-level status codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Continue,
    Ok,
    BadRequest,
    PayloadTooLarge,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::PayloadTooLarge => 413,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::PayloadTooLarge => "Payload Too Large",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}
