//! HTTP/1.x Wire Protocol
//!
//! This module covers both directions of the wire:
//!
//! - `types`: request heads, decoded parts and status codes
//! - `parser`: incremental request decoder (head, body fragments, end)
//! - `response`: JSON response writer
//!
//! ## Example
//!
//! ```ignore
//! use apiserver::protocol::{HttpPart, RequestDecoder};
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from(&b"GET /users HTTP/1.1\r\n\r\n"[..]);
//!
//! while let Some(part) = decoder.decode(&mut buffer)? {
//!     println!("Decoded: {:?}", part);
//! }
//! ```

pub mod parser;
pub mod response;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{ParseError, ParseResult, RequestDecoder};
pub use response::{continue_response, HttpResponse, ResponseError};
pub use types::{BodyFraming, HttpPart, RequestHead, StatusCode, Version};
