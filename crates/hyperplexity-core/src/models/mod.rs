pub mod conversation;
pub mod job;
pub mod results;
pub mod upload;

pub use conversation::*;
pub use job::*;
pub use results::*;
pub use upload::*;

use serde_json::{Map, Value};

use crate::error::{HpxError, HpxResult};

/// Require a remote payload to be a JSON object.
pub(crate) fn into_object(value: Value, what: &str) -> HpxResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(HpxError::Decode(format!(
            "expected a JSON object for {}, got {}",
            what, other
        ))),
    }
}

pub(crate) fn str_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Read a number that the API sometimes sends as a string.
pub(crate) fn f64_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    }
}

pub(crate) fn i64_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
