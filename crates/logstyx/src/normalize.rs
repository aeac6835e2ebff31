//! Turns arbitrary log arguments into a bounded, JSON-safe record.
//!
//! The shape of the argument is decided once, when it is converted into a
//! [`LogInput`]; [`normalize`] then handles each variant on its own:
//!
//! | Input               | Record                                        |
//! |---------------------|-----------------------------------------------|
//! | error               | `{title, message, stack, ...extra}`           |
//! | absent              | `{message: "null"}` / `{message: "undefined"}`|
//! | sequence            | `{message: "<compact JSON of the sequence>"}` |
//! | mapping             | the mapping itself                            |
//! | scalar              | `{message: "<text>"}`                         |
//!
//! Error extras go through [`safe_clone`], which is bounded in depth, string
//! length and array length and replaces cycles with a marker, so it always
//! terminates no matter what it is given.

use serde_json::json;
use std::backtrace::Backtrace;
use std::collections::HashSet;

use crate::value::{Value, CIRCULAR_MARKER};
use crate::Record;

/// Containers deeper than this (root = 0) collapse to [`MAX_DEPTH_MARKER`].
pub const MAX_CLONE_DEPTH: usize = 2;

/// Strings longer than this many characters are truncated.
pub const MAX_STRING_LENGTH: usize = 500;

/// Arrays keep at most this many leading items.
pub const MAX_ARRAY_ITEMS: usize = 10;

pub const MAX_DEPTH_MARKER: &str = "[Max Depth]";

/// Appended to truncated strings.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

const RESERVED_ERROR_KEYS: [&str; 3] = ["title", "message", "stack"];

/// Which kind of absence was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    Null,
    Undefined,
}

/// A log argument, classified.
#[derive(Debug, Clone)]
pub enum LogInput {
    Error(ErrorInput),
    Absent(Absence),
    Sequence(Vec<Value>),
    Mapping(Record),
    Scalar(String),
}

/// An error or exception as seen by the logger.
#[derive(Debug, Clone)]
pub struct ErrorInput {
    /// Kind name, sent as `title`.
    pub kind: String,
    pub message: String,
    pub stack: Option<String>,
    /// Additional properties, sent alongside after [`safe_clone`].
    pub properties: Vec<(String, Value)>,
}

impl ErrorInput {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack: None,
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Captures a Rust error.
    ///
    /// The kind is the last path segment of the error's type name, the
    /// stack is a backtrace taken here, and the `source()` chain (if any)
    /// is attached as a `causes` property.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(Value::from(cause.to_string()));
            source = cause.source();
        }

        let mut input = Self::new(short_type_name::<E>(), error.to_string())
            .with_stack(Backtrace::force_capture().to_string());
        if !causes.is_empty() {
            input = input.with_property("causes", Value::array(causes));
        }
        input
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    let name = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics);
    name.trim_start_matches("dyn ").to_string()
}

impl LogInput {
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        LogInput::Error(ErrorInput::from_error(error))
    }
}

impl From<ErrorInput> for LogInput {
    fn from(error: ErrorInput) -> Self {
        LogInput::Error(error)
    }
}

impl From<Value> for LogInput {
    fn from(value: Value) -> Self {
        match value {
            Value::Undefined => LogInput::Absent(Absence::Undefined),
            Value::Null => LogInput::Absent(Absence::Null),
            Value::Array(node) => LogInput::Sequence(node.items()),
            Value::Object(_) => match value.to_json() {
                serde_json::Value::Object(map) => LogInput::Mapping(map),
                _ => LogInput::Mapping(Record::new()),
            },
            scalar => LogInput::Scalar(scalar.display_text()),
        }
    }
}

impl From<serde_json::Value> for LogInput {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Object(map) => LogInput::Mapping(map),
            other => Value::from(other).into(),
        }
    }
}

impl From<Record> for LogInput {
    fn from(map: Record) -> Self {
        LogInput::Mapping(map)
    }
}

impl From<&str> for LogInput {
    fn from(s: &str) -> Self {
        LogInput::Scalar(s.to_string())
    }
}

impl From<String> for LogInput {
    fn from(s: String) -> Self {
        LogInput::Scalar(s)
    }
}

impl From<bool> for LogInput {
    fn from(b: bool) -> Self {
        Value::from(b).into()
    }
}

impl From<i64> for LogInput {
    fn from(n: i64) -> Self {
        Value::from(n).into()
    }
}

impl From<i32> for LogInput {
    fn from(n: i32) -> Self {
        Value::from(n).into()
    }
}

impl From<u64> for LogInput {
    fn from(n: u64) -> Self {
        Value::from(n).into()
    }
}

impl From<f64> for LogInput {
    fn from(n: f64) -> Self {
        Value::from(n).into()
    }
}

impl<T: Into<Value>> From<Vec<T>> for LogInput {
    fn from(items: Vec<T>) -> Self {
        LogInput::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<LogInput>> From<Option<T>> for LogInput {
    fn from(value: Option<T>) -> Self {
        value.map_or(LogInput::Absent(Absence::Null), Into::into)
    }
}

/// Builds the record for one log argument.
#[must_use]
pub fn normalize(input: LogInput) -> Record {
    match input {
        LogInput::Error(error) => normalize_error(error),
        LogInput::Absent(Absence::Null) => message_record("null".to_string()),
        LogInput::Absent(Absence::Undefined) => message_record("undefined".to_string()),
        LogInput::Sequence(items) => {
            // Serialized whole, without clone limits.
            message_record(Value::array(items).to_json().to_string())
        }
        LogInput::Mapping(map) => map,
        LogInput::Scalar(text) => message_record(text),
    }
}

fn message_record(message: String) -> Record {
    let mut record = Record::new();
    record.insert("message".to_string(), serde_json::Value::String(message));
    record
}

fn normalize_error(error: ErrorInput) -> Record {
    let mut record = Record::new();
    record.insert("title".to_string(), json!(error.kind));
    record.insert("message".to_string(), json!(error.message));
    record.insert("stack".to_string(), json!(error.stack));

    for (key, value) in &error.properties {
        if RESERVED_ERROR_KEYS.contains(&key.as_str()) || key.starts_with('_') {
            continue;
        }
        let mut path = HashSet::new();
        if let Some(cloned) = clone_value(value, 0, &mut path) {
            record.insert(key.clone(), cloned);
        }
    }
    record
}

/// Bounded deep copy of `value` into JSON.
///
/// - cycles become [`CIRCULAR_MARKER`]
/// - arrays and objects deeper than [`MAX_CLONE_DEPTH`] become [`MAX_DEPTH_MARKER`]
/// - strings keep [`MAX_STRING_LENGTH`] characters plus [`TRUNCATION_MARKER`]
/// - arrays keep their first [`MAX_ARRAY_ITEMS`] items
/// - functions, `undefined` object fields and `_`-prefixed keys are left out
///
/// A root that is itself left out clones to `null`.
#[must_use]
pub fn safe_clone(value: &Value) -> serde_json::Value {
    let mut path = HashSet::new();
    clone_value(value, 0, &mut path).unwrap_or(serde_json::Value::Null)
}

fn clone_value(
    value: &Value,
    depth: usize,
    path: &mut HashSet<usize>,
) -> Option<serde_json::Value> {
    match value {
        Value::Undefined | Value::Function => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Number(n) => Some(serde_json::Value::Number(n.clone())),
        Value::String(s) => Some(serde_json::Value::String(truncate(s))),
        Value::Array(node) => {
            if path.contains(&node.id()) {
                return Some(CIRCULAR_MARKER.into());
            }
            if depth > MAX_CLONE_DEPTH {
                return Some(MAX_DEPTH_MARKER.into());
            }
            path.insert(node.id());
            let items = node
                .items()
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .filter(|item| !matches!(item, Value::Function))
                .map(|item| clone_value(item, depth + 1, path).unwrap_or(serde_json::Value::Null))
                .collect();
            path.remove(&node.id());
            Some(serde_json::Value::Array(items))
        }
        Value::Object(node) => {
            if path.contains(&node.id()) {
                return Some(CIRCULAR_MARKER.into());
            }
            if depth > MAX_CLONE_DEPTH {
                return Some(MAX_DEPTH_MARKER.into());
            }
            path.insert(node.id());
            let mut map = Record::new();
            for (key, item) in node.entries() {
                if key.starts_with('_') {
                    continue;
                }
                if let Some(cloned) = clone_value(&item, depth + 1, path) {
                    map.insert(key, cloned);
                }
            }
            path.remove(&node.id());
            Some(serde_json::Value::Object(map))
        }
    }
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_STRING_LENGTH) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &s[..cut]),
        None => s.to_string(),
    }
}
