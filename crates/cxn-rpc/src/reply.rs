//! API result bodies: `{"is_error": 0, "values": ..}` or
//! `{"is_error": 1, "error_message": ..}`.

use serde_json::{json, Value};

pub fn success(values: Value) -> Value {
    json!({ "is_error": 0, "values": values })
}

pub fn error(message: impl Into<String>) -> Value {
    json!({ "is_error": 1, "error_message": message.into() })
}

/// True only when `is_error` is present and equals 0 (integer or float) or
/// `false`.
pub fn is_ok(data: &Value) -> bool {
    match data.get("is_error") {
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::Bool(b)) => !b,
        _ => false,
    }
}

/// `error_message` from a failed result, if any.
pub fn error_message(data: &Value) -> Option<&str> {
    data.get("error_message").and_then(|v| v.as_str())
}
