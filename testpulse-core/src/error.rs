//! Payload error taxonomy
//!
//! Strict decoders return these errors. The lenient entry points used by the
//! dashboard recover from every variant locally and fall back to an empty or
//! "no data" result.

/// Failure to turn a payload string into the expected top-level structure.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Payload is not valid JSON
    #[error("payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Payload parsed but the top-level value has the wrong type
    #[error("expected {expected} at top level, found {found}")]
    Shape {
        expected: &'static str,
        found: &'static str,
    },
}

/// Why a single array element could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedEntry {
    /// Element is not a JSON object
    #[error("entry is {0}, not an object")]
    NotAnObject(&'static str),

    /// A field is present but has an unusable type or value
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Human-readable name of a JSON value's type, for error messages.
pub fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
