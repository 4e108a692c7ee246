//! Per-request field map handed from the aggregator to a handler.

use std::collections::HashMap;

/// Field holding the request target (path and query).
pub const REQUEST_URI: &str = "REQUEST_URI";

/// Field holding the request method.
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";

/// The fields extracted from one request.
///
/// Holds the method, the request target, whitelisted headers and form
/// attributes. A context is built by the aggregator, moved into exactly one
/// handler, and dropped with it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestContext {
    fields: HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Returns the field only if it is present and non-empty.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn uri(&self) -> Option<&str> {
        self.get(REQUEST_URI)
    }

    pub fn method(&self) -> Option<&str> {
        self.get(REQUEST_METHOD)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
