//! Request Aggregator
//!
//! Reassembles one logical request from the parts produced by the decoder and
//! extracts the fields handlers need into a [`RequestContext`].
//!
//! ## Lifecycle of the Context
//!
//! ```text
//!   Head ──> context cleared, method / uri / whitelisted headers inserted
//!    │
//!  Body* ──> bytes appended (size cap enforced)
//!    │
//!   End ───> form attributes extracted, context moved out as CompleteRequest
//! ```
//!
//! Whatever happens (success, decode failure, abandoned request) the context
//! held here is empty again before the next head is accepted.

use crate::protocol::types::{header, HttpPart, RequestHead};
use crate::request::body::{extract_attributes, AttributeError};
use crate::request::context::{RequestContext, REQUEST_METHOD, REQUEST_URI};
use bytes::BytesMut;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum aggregated body size (64 KB)
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024;

/// Header names copied into the context by default.
pub const DEFAULT_CONTEXT_HEADERS: [&str; 3] = ["token", "email", "test"];

/// Errors that make a request undeliverable to a handler.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregateError {
    /// Declared or received body exceeds the configured limit
    #[error("request body exceeds {max} bytes")]
    TooLarge { max: usize },

    /// Body or end marker arrived with no request head
    #[error("{0} received before request head")]
    UnexpectedPart(&'static str),

    /// A form attribute could not be extracted
    #[error("attribute extraction failed: {0}")]
    Attribute(#[from] AttributeError),
}

/// Immutable set of header names that reach the request context.
///
/// Matching is case-insensitive; names are stored lowercased.
#[derive(Debug, Clone)]
pub struct HeaderWhitelist(Arc<HashSet<String>>);

impl HeaderWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(Arc::new(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_ascii_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        ))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for HeaderWhitelist {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_HEADERS)
    }
}

/// Aggregator settings shared by every connection.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub max_content_length: usize,
    pub headers: HeaderWhitelist,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            headers: HeaderWhitelist::default(),
        }
    }
}

/// A fully received request, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteRequest {
    pub context: RequestContext,
    pub keep_alive: bool,
    pub accepts_gzip: bool,
}

/// What the aggregator remembers about the head while the body streams in.
#[derive(Debug)]
struct PendingRequest {
    content_type: Option<String>,
    keep_alive: bool,
    accepts_gzip: bool,
}

/// Per-connection request aggregator.
#[derive(Debug)]
pub struct RequestAggregator {
    config: AggregatorConfig,
    context: RequestContext,
    pending: Option<PendingRequest>,
    body: BytesMut,
}

impl RequestAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            context: RequestContext::new(),
            pending: None,
            body: BytesMut::new(),
        }
    }

    /// The context currently being built.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Returns true while a request is partially received.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Feeds one decoded part.
    ///
    /// Returns `Ok(Some(request))` once the end marker has been seen. Any
    /// error leaves the aggregator reset.
    pub fn push(&mut self, part: HttpPart) -> Result<Option<CompleteRequest>, AggregateError> {
        let result = match part {
            HttpPart::Head(head) => self.on_head(head).map(|()| None),
            HttpPart::Body(chunk) => self.on_body(&chunk).map(|()| None),
            HttpPart::End => self.on_end().map(Some),
        };
        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Discards any partially built request.
    pub fn reset(&mut self) {
        self.context.clear();
        self.pending = None;
        self.body.clear();
    }

    fn on_head(&mut self, head: RequestHead) -> Result<(), AggregateError> {
        self.reset();

        let max = self.config.max_content_length;
        if head.content_length().is_some_and(|n| n > max as u64) {
            return Err(AggregateError::TooLarge { max });
        }

        for (name, value) in &head.headers {
            if self.config.headers.contains(name) {
                self.context.insert(name.as_str(), value.as_str());
            }
        }
        self.context.insert(REQUEST_URI, head.uri.as_str());
        self.context.insert(REQUEST_METHOD, head.method.as_str());

        self.pending = Some(PendingRequest {
            content_type: head.header(header::CONTENT_TYPE).map(str::to_string),
            keep_alive: head.is_keep_alive(),
            accepts_gzip: head.accepts_gzip(),
        });
        Ok(())
    }

    fn on_body(&mut self, chunk: &[u8]) -> Result<(), AggregateError> {
        if self.pending.is_none() {
            return Err(AggregateError::UnexpectedPart("body"));
        }
        let max = self.config.max_content_length;
        if self.body.len() + chunk.len() > max {
            return Err(AggregateError::TooLarge { max });
        }
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn on_end(&mut self) -> Result<CompleteRequest, AggregateError> {
        let pending = self
            .pending
            .take()
            .ok_or(AggregateError::UnexpectedPart("end of message"))?;

        if let Err(e) = extract_attributes(
            pending.content_type.as_deref(),
            &self.body,
            &mut self.context,
        ) {
            warn!(error = %e, uri = self.context.uri().unwrap_or(""), "Body attribute extraction failed");
            return Err(e.into());
        }
        self.body.clear();

        let context = std::mem::take(&mut self.context);
        debug!(fields = context.len(), "Request aggregated");

        Ok(CompleteRequest {
            context,
            keep_alive: pending.keep_alive,
            accepts_gzip: pending.accepts_gzip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{BodyFraming, Version};
    use bytes::Bytes;

    fn head(method: &str, uri: &str, headers: &[(&str, &str)], framing: BodyFraming) -> HttpPart {
        HttpPart::Head(RequestHead {
            method: method.to_string(),
            uri: uri.to_string(),
            version: Version::Http11,
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            framing,
        })
    }

    fn body(data: &'static [u8]) -> HttpPart {
        HttpPart::Body(Bytes::from_static(data))
    }

    #[test]
    fn test_extracts_route_fields_and_whitelisted_headers() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());

        let parts = [
            head(
                "GET",
                "/users?page=1",
                &[("email", "a@b.c"), ("host", "localhost"), ("token", "t")],
                BodyFraming::Empty,
            ),
            HttpPart::End,
        ];
        let mut complete = None;
        for part in parts {
            complete = agg.push(part).unwrap();
        }

        let request = complete.unwrap();
        let ctx = &request.context;
        assert_eq!(ctx.uri(), Some("/users?page=1"));
        assert_eq!(ctx.method(), Some("GET"));
        assert_eq!(ctx.get("email"), Some("a@b.c"));
        assert_eq!(ctx.get("token"), Some("t"));
        assert!(!ctx.contains("host"));
        assert_eq!(ctx.len(), 4);
        assert!(request.keep_alive);
    }

    #[test]
    fn test_whitelist_is_case_insensitive() {
        let whitelist = HeaderWhitelist::new(["Token", " email "]);
        assert!(whitelist.contains("TOKEN"));
        assert!(whitelist.contains("email"));
        assert!(!whitelist.contains("test"));
        assert_eq!(whitelist.len(), 2);
    }

    #[test]
    fn test_custom_whitelist() {
        let config = AggregatorConfig {
            max_content_length: 1024,
            headers: HeaderWhitelist::new(["x-api-key"]),
        };
        let mut agg = RequestAggregator::new(config);
        agg.push(head("GET", "/", &[("x-api-key", "k"), ("email", "e")], BodyFraming::Empty))
            .unwrap();
        let request = agg.push(HttpPart::End).unwrap().unwrap();
        assert_eq!(request.context.get("x-api-key"), Some("k"));
        assert!(!request.context.contains("email"));
    }

    #[test]
    fn test_body_attributes_across_fragments() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());
        agg.push(head("POST", "/tokens", &[], BodyFraming::Length(28))).unwrap();
        agg.push(body(b"userNo=12312&")).unwrap();
        agg.push(body(b"password=secret")).unwrap();
        let request = agg.push(HttpPart::End).unwrap().unwrap();

        assert_eq!(request.context.get("userNo"), Some("12312"));
        assert_eq!(request.context.get("password"), Some("secret"));
    }

    #[test]
    fn test_context_is_empty_after_each_request() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());

        agg.push(head("GET", "/users", &[("email", "a@b.c")], BodyFraming::Empty))
            .unwrap();
        assert!(!agg.context().is_empty());
        agg.push(HttpPart::End).unwrap().unwrap();
        assert!(agg.context().is_empty());
        assert!(!agg.in_progress());

        agg.push(head("GET", "/users", &[], BodyFraming::Empty)).unwrap();
        let second = agg.push(HttpPart::End).unwrap().unwrap();
        assert!(!second.context.contains("email"));
    }

    #[test]
    fn test_declared_length_over_limit_is_rejected() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());
        let err = agg
            .push(head(
                "POST",
                "/users",
                &[],
                BodyFraming::Length(DEFAULT_MAX_CONTENT_LENGTH as u64 + 1),
            ))
            .unwrap_err();
        assert_eq!(err, AggregateError::TooLarge { max: DEFAULT_MAX_CONTENT_LENGTH });
        assert!(agg.context().is_empty());
    }

    #[test]
    fn test_accumulated_body_over_limit_is_rejected() {
        let config = AggregatorConfig {
            max_content_length: 8,
            ..AggregatorConfig::default()
        };
        let mut agg = RequestAggregator::new(config);
        agg.push(head("POST", "/users", &[], BodyFraming::Chunked)).unwrap();
        agg.push(body(b"email=")).unwrap();
        assert_eq!(
            agg.push(body(b"a@b.c")).unwrap_err(),
            AggregateError::TooLarge { max: 8 }
        );
        assert!(!agg.in_progress());
        assert!(agg.context().is_empty());
    }

    #[test]
    fn test_body_exactly_at_limit_is_accepted() {
        let config = AggregatorConfig {
            max_content_length: 11,
            ..AggregatorConfig::default()
        };
        let mut agg = RequestAggregator::new(config);
        agg.push(head("POST", "/users", &[], BodyFraming::Length(11))).unwrap();
        agg.push(body(b"email=a@b.c")).unwrap();
        let request = agg.push(HttpPart::End).unwrap().unwrap();
        assert_eq!(request.context.get("email"), Some("a@b.c"));
    }

    #[test]
    fn test_attribute_failure_discards_context() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());
        agg.push(head("POST", "/users", &[("email", "a@b.c")], BodyFraming::Length(5)))
            .unwrap();
        agg.push(body(b"a=%zz")).unwrap();
        let err = agg.push(HttpPart::End).unwrap_err();
        assert!(matches!(err, AggregateError::Attribute(AttributeError::BadEscape(_))));
        assert!(agg.context().is_empty());
    }

    #[test]
    fn test_parts_without_head_are_rejected() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());
        assert_eq!(
            agg.push(body(b"x")).unwrap_err(),
            AggregateError::UnexpectedPart("body")
        );
        assert_eq!(
            agg.push(HttpPart::End).unwrap_err(),
            AggregateError::UnexpectedPart("end of message")
        );
    }

    #[test]
    fn test_keep_alive_and_gzip_flags() {
        let mut agg = RequestAggregator::new(AggregatorConfig::default());
        agg.push(head(
            "GET",
            "/users",
            &[("connection", "close"), ("accept-encoding", "gzip")],
            BodyFraming::Empty,
        ))
        .unwrap();
        let request = agg.push(HttpPart::End).unwrap().unwrap();
        assert!(!request.keep_alive);
        assert!(request.accepts_gzip);
    }
}
