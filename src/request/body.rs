//! Form Attribute Extraction
//!
//! Pulls name/value attributes out of an aggregated request body.
//!
//! | Content-Type | Handling |
//! |---|---|
//! | none, `application/x-www-form-urlencoded` | every `name=value` pair |
//! | `multipart/form-data` | named parts; file parts are logged and skipped |
//! | anything else | logged, nothing extracted |

use crate::request::context::{RequestContext, REQUEST_METHOD, REQUEST_URI};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that abort attribute extraction for a request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttributeError {
    #[error("form body is not valid UTF-8")]
    NotUtf8,

    #[error("malformed percent-escape in attribute '{0}'")]
    BadEscape(String),

    #[error("multipart content type has no boundary")]
    MissingBoundary,

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(&'static str),

    #[error("multipart part has no name")]
    UnnamedPart,

    #[error("value of attribute '{0}' is not valid UTF-8")]
    InvalidValue(String),
}

enum BodyKind<'a> {
    UrlEncoded,
    Multipart { boundary: &'a str },
    Other(&'a str),
}

fn classify(content_type: Option<&str>) -> Result<BodyKind<'_>, AttributeError> {
    let Some(content_type) = content_type else {
        return Ok(BodyKind::UrlEncoded);
    };

    let mut params = content_type.split(';');
    let mime = params.next().unwrap_or("").trim();

    if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Ok(BodyKind::UrlEncoded)
    } else if mime.eq_ignore_ascii_case("multipart/form-data") {
        params
            .filter_map(|p| p.trim().split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("boundary"))
            .map(|(_, v)| v.trim().trim_matches('"'))
            .filter(|b| !b.is_empty())
            .map(|boundary| BodyKind::Multipart { boundary })
            .ok_or(AttributeError::MissingBoundary)
    } else {
        Ok(BodyKind::Other(content_type))
    }
}

/// Extracts form attributes from `body` into `ctx`.
///
/// Returns the number of attributes added. On error `ctx` may hold some of the
/// attributes already extracted; the caller discards it.
pub fn extract_attributes(
    content_type: Option<&str>,
    body: &[u8],
    ctx: &mut RequestContext,
) -> Result<usize, AttributeError> {
    if body.is_empty() {
        return Ok(0);
    }

    match classify(content_type)? {
        BodyKind::UrlEncoded => extract_urlencoded(body, ctx),
        BodyKind::Multipart { boundary } => extract_multipart(body, boundary, ctx),
        BodyKind::Other(content_type) => {
            info!(content_type, bytes = body.len(), "Body content not processed");
            Ok(0)
        }
    }
}

fn extract_urlencoded(body: &[u8], ctx: &mut RequestContext) -> Result<usize, AttributeError> {
    let text = std::str::from_utf8(body).map_err(|_| AttributeError::NotUtf8)?;

    let mut count = 0;
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        if !escapes_well_formed(pair) {
            return Err(AttributeError::BadEscape(raw_name.to_string()));
        }

        let name = decode_component(raw_name)
            .ok_or_else(|| AttributeError::InvalidValue(raw_name.to_string()))?;
        if name.is_empty() {
            continue;
        }
        let value =
            decode_component(raw_value).ok_or_else(|| AttributeError::InvalidValue(name.clone()))?;
        if insert_attribute(ctx, &name, &value) {
            count += 1;
        }
    }
    Ok(count)
}

/// Decodes `+` and percent-escapes; `None` if the result is not UTF-8.
fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(Cow::into_owned)
}

fn extract_multipart(
    body: &[u8],
    boundary: &str,
    ctx: &mut RequestContext,
) -> Result<usize, AttributeError> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();
    let next_delimiter = [b"\r\n".as_slice(), delimiter].concat();

    let mut pos = find(body, delimiter)
        .ok_or(AttributeError::MalformedMultipart("missing opening boundary"))?
        + delimiter.len();
    let mut count = 0;

    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            return Ok(count);
        }
        if !rest.starts_with(b"\r\n") {
            return Err(AttributeError::MalformedMultipart(
                "boundary not followed by CRLF",
            ));
        }

        let headers_end = find(rest, b"\r\n\r\n")
            .ok_or(AttributeError::MalformedMultipart("unterminated part headers"))?
            + pos;
        let headers = if headers_end > pos + 2 {
            std::str::from_utf8(&body[pos + 2..headers_end])
                .map_err(|_| AttributeError::MalformedMultipart("non-UTF-8 part headers"))?
        } else {
            ""
        };

        let data_start = headers_end + 4;
        let data_end = find(&body[data_start..], &next_delimiter)
            .ok_or(AttributeError::MalformedMultipart("missing closing boundary"))?
            + data_start;
        let data = &body[data_start..data_end];

        let (name, filename) = content_disposition(headers);
        match (name, filename) {
            (name, Some(filename)) => {
                info!(
                    field = name.unwrap_or_default(),
                    filename,
                    bytes = data.len(),
                    "Ignoring file upload"
                );
            }
            (None, None) => return Err(AttributeError::UnnamedPart),
            (Some(name), None) => {
                let value = std::str::from_utf8(data)
                    .map_err(|_| AttributeError::InvalidValue(name.to_string()))?;
                if insert_attribute(ctx, name, value) {
                    count += 1;
                }
            }
        }

        pos = data_end + next_delimiter.len();
    }
}

/// Reads `name` and `filename` from a part's Content-Disposition header.
fn content_disposition(headers: &str) -> (Option<&str>, Option<&str>) {
    let Some(value) = headers.split("\r\n").find_map(|line| {
        line.split_once(':')
            .filter(|(n, _)| n.trim().eq_ignore_ascii_case("content-disposition"))
            .map(|(_, v)| v)
    }) else {
        return (None, None);
    };

    let mut name = None;
    let mut filename = None;
    for param in value.split(';').skip(1) {
        if let Some((key, val)) = param.trim().split_once('=') {
            let val = val.trim().trim_matches('"');
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(val),
                "filename" => filename = Some(val),
                _ => {}
            }
        }
    }
    (name, filename)
}

/// Adds an attribute unless it would shadow a routing field.
fn insert_attribute(ctx: &mut RequestContext, name: &str, value: &str) -> bool {
    if name == REQUEST_URI || name == REQUEST_METHOD {
        debug!(attribute = name, "Ignoring body attribute with reserved name");
        return false;
    }
    ctx.insert(name, value);
    true
}

/// Every `%` must be followed by two hex digits.
fn escapes_well_formed(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes
                .get(i + 1..i + 3)
                .is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));
            if !ok {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    true
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
