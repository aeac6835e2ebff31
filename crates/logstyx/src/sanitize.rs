//! Strips empty fields from a record before it goes on the wire.

use serde_json::Value;

use crate::Record;

/// Returns true when `value` carries no information worth transmitting:
/// `null`, `""`, `[]` or `{}`. `0` and `false` are kept.
#[must_use]
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Copies `record`, leaving out every key whose value is empty.
///
/// Only the top level is inspected; nested values are copied unchanged.
#[must_use]
pub fn sanitize(record: &Record) -> Record {
    record
        .iter()
        .filter(|(_, value)| !is_empty_value(value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
