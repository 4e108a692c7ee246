//! Structured handler results.

use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the business status field.
pub const RESULT_CODE: &str = "resultCode";

/// Name of the human-readable outcome field.
pub const MESSAGE: &str = "message";

/// Business-level result codes carried in the `resultCode` field.
pub mod result_code {
    pub const SUCCESS: &str = "200";
    pub const NOT_FOUND: &str = "404";
    /// Required request parameters missing or invalid
    pub const BAD_PARAMETER: &str = "405";
    /// The handler's own logic could not complete
    pub const SERVICE_ERROR: &str = "501";
}

/// The ordered set of fields one handler invocation produces.
///
/// Fields keep their insertion order when serialized; setting an existing
/// field replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ApiResult(Map<String, Value>);

impl ApiResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), Value::String(value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn set_result_code(&mut self, code: impl Into<String>) {
        self.set(RESULT_CODE, code);
    }

    pub fn result_code(&self) -> Option<&str> {
        self.get(RESULT_CODE)
    }

    /// Field names in serialization order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
