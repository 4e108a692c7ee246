//! JSON Response Writer
//!
//! Builds the HTTP/1.1 response for one request from a structured
//! [`ApiResult`]. The writer knows nothing about individual handlers: any
//! result shape is serialized as a JSON object.
//!
//! ## Wire Format
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! content-type: application/json; charset=UTF-8\r\n
//! content-length: 54\r\n                  <- keep-alive only
//! connection: keep-alive\r\n
//! \r\n
//! {"resultCode":"200","message":"Success","userNo":"12312"}
//! ```
//!
//! The transport status only says whether the request could be decoded. The
//! business outcome travels inside the body as `resultCode`.

use crate::handlers::ApiResult;
use crate::protocol::types::{header, StatusCode};
use bytes::{BufMut, Bytes, BytesMut};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use thiserror::Error;

/// Content type of every response body
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Errors raised while building a response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to compress body: {0}")]
    Compress(#[from] std::io::Error),
}

/// A complete response ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: StatusCode,
    keep_alive: bool,
    gzip: bool,
    body: Bytes,
}

impl HttpResponse {
    /// Builds a JSON response for `result`.
    pub fn json(
        status: StatusCode,
        result: &ApiResult,
        keep_alive: bool,
    ) -> Result<Self, ResponseError> {
        let body = serde_json::to_vec(result)?;
        Ok(Self {
            status,
            keep_alive,
            gzip: false,
            body: Bytes::from(body),
        })
    }

    /// Builds the response for a request that could not be decoded.
    ///
    /// The connection is always closed afterwards.
    pub fn decode_failure(status: StatusCode, reason: &str) -> Result<Self, ResponseError> {
        let mut result = ApiResult::new();
        result.set_result_code(status.code().to_string());
        result.set("message", reason);
        Self::json(status, &result, false)
    }

    /// Gzip-compresses the body.
    pub fn compressed(mut self) -> Result<Self, ResponseError> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(self.body.len()), Compression::default());
        encoder.write_all(&self.body)?;
        self.body = Bytes::from(encoder.finish()?);
        self.gzip = true;
        Ok(self)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Serializes the response for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(128 + self.body.len());
        self.serialize_into(&mut buf);
        buf.to_vec()
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        put_status_line(buf, self.status);
        put_header(buf, header::CONTENT_TYPE, JSON_CONTENT_TYPE);
        if self.gzip {
            put_header(buf, header::CONTENT_ENCODING, "gzip");
        }
        if self.keep_alive {
            // Without keep-alive the body is delimited by closing the connection.
            put_header(buf, header::CONTENT_LENGTH, &self.body.len().to_string());
            put_header(buf, header::CONNECTION, "keep-alive");
        } else {
            put_header(buf, header::CONNECTION, "close");
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
    }
}

/// The interim response sent to clients that asked for `Expect: 100-continue`.
pub fn continue_response() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(32);
    put_status_line(&mut buf, StatusCode::Continue);
    buf.put_slice(b"\r\n");
    buf.to_vec()
}

fn put_status_line(buf: &mut BytesMut, status: StatusCode) {
    buf.put_slice(b"HTTP/1.1 ");
    buf.put_slice(status.to_string().as_bytes());
    buf.put_slice(b"\r\n");
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}
