// Operation result and parameter bag types.
// Defines the untyped parameter map passed to tools and the result they return.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Untyped parameter bag passed to every operation.
pub type Params = Map<String, Value>;

/// Result of one operation invocation.
///
/// Exactly one of `payload` or `error_message` is meaningful, selected by
/// `is_error`. Only successful results are ever written to a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    payload: Option<Value>,
    is_error: bool,
    error_message: Option<String>,
}

impl OperationResult {
    /// Create a successful result.
    pub fn success(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            is_error: false,
            error_message: None,
        }
    }

    /// Create a business-error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            payload: None,
            is_error: true,
            error_message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// The success payload, if this is not an error.
    pub fn payload(&self) -> Option<&Value> {
        if self.is_error {
            None
        } else {
            self.payload.as_ref()
        }
    }

    /// The error message, if this is an error.
    pub fn error_message(&self) -> Option<&str> {
        if self.is_error {
            self.error_message.as_deref()
        } else {
            None
        }
    }
}

/// Typed accessors over a raw parameter bag.
pub trait ParamsExt {
    /// Non-empty string value for `key`.
    fn get_str(&self, key: &str) -> Option<&str>;

    /// Integer value for `key`; accepts JSON numbers and numeric strings.
    fn get_int(&self, key: &str) -> Option<i64>;

    /// List of strings for `key`; accepts an array or a comma-separated string.
    fn get_string_list(&self, key: &str) -> Option<Vec<String>>;
}

impl ParamsExt for Params {
    fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        }
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = match self.get(key)? {
            Value::Array(values) => values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .collect(),
            Value::String(s) => s.split(',').map(|s| s.trim().to_string()).collect(),
            _ => return None,
        };

        let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
        if items.is_empty() { None } else { Some(items) }
    }
}
