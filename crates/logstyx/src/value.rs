//! Dynamically typed log arguments.
//!
//! Applications hand the client arbitrary data: scalars, nested objects and
//! arrays, sometimes with shared or self-referencing nodes. [`Value`] models
//! that input. Arrays and objects are reference-counted nodes with a stable
//! identity, so a node can be reachable from itself:
//!
//! ```rust
//! use logstyx::value::{ObjectRef, Value};
//!
//! let node = ObjectRef::new();
//! node.insert("name", "loop");
//! node.insert("me", node.clone());
//!
//! let json = Value::from(node).to_json();
//! assert_eq!(json["me"], "[Circular]");
//! ```

use serde_json::Number;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Marker substituted for a node that is already being visited.
pub const CIRCULAR_MARKER: &str = "[Circular]";

/// A caller-supplied value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// An opaque callable. Never transmitted.
    Function,
    Array(ArrayRef),
    Object(ObjectRef),
}

/// Shared, mutable object node. Clones alias the same node.
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<Vec<(String, Value)>>>);

/// Shared, mutable array node. Clones alias the same node.
#[derive(Clone, Default)]
pub struct ArrayRef(Arc<RwLock<Vec<Value>>>);

impl ObjectRef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of the node, stable for its whole lifetime.
    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut entries = self.0.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.0.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Snapshot of the entries in insertion order.
    ///
    /// The lock is released before returning, so callers may walk into
    /// nested nodes (including this one) without holding it.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArrayRef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value.into());
    }

    /// Snapshot of the items, see [`ObjectRef::entries`].
    #[must_use]
    pub fn items(&self) -> Vec<Value> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Nodes may contain themselves, so Debug must not descend.
impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(#{:x}, {} entries)", self.id(), self.len())
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayRef(#{:x}, {} items)", self.id(), self.len())
    }
}

impl Value {
    /// Creates a fresh object node from key/value pairs.
    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let node = ObjectRef::new();
        for (key, value) in entries {
            node.insert(key, value);
        }
        Value::Object(node)
    }

    /// Creates a fresh array node.
    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        let node = ArrayRef::new();
        for item in items {
            node.push(item);
        }
        Value::Array(node)
    }

    /// Full-fidelity JSON conversion.
    ///
    /// No depth or size limit is applied; only cycles are cut, with
    /// [`CIRCULAR_MARKER`] in place of the repeated node. `Undefined` and
    /// functions are dropped from objects and become `null` in arrays.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = HashSet::new();
        self.to_json_inner(&mut path)
            .unwrap_or(serde_json::Value::Null)
    }

    fn to_json_inner(&self, path: &mut HashSet<usize>) -> Option<serde_json::Value> {
        match self {
            Value::Undefined | Value::Function => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => Some(serde_json::Value::Number(n.clone())),
            Value::String(s) => Some(serde_json::Value::String(s.clone())),
            Value::Array(node) => {
                if !path.insert(node.id()) {
                    return Some(CIRCULAR_MARKER.into());
                }
                let items = node
                    .items()
                    .iter()
                    .map(|item| item.to_json_inner(path).unwrap_or(serde_json::Value::Null))
                    .collect();
                path.remove(&node.id());
                Some(serde_json::Value::Array(items))
            }
            Value::Object(node) => {
                if !path.insert(node.id()) {
                    return Some(CIRCULAR_MARKER.into());
                }
                let mut map = serde_json::Map::new();
                for (key, value) in node.entries() {
                    if let Some(json) = value.to_json_inner(path) {
                        map.insert(key, json);
                    }
                }
                path.remove(&node.id());
                Some(serde_json::Value::Object(map))
            }
        }
    }

    /// Textual form of a scalar, as it appears in a `message` field.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_text(n),
            Value::String(s) => s.clone(),
            Value::Function => "[Function]".to_string(),
            Value::Array(_) | Value::Object(_) => self.to_json().to_string(),
        }
    }
}

/// Integers print without a fraction, floats use the shortest round-trip form.
pub(crate) fn number_text(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<ObjectRef> for Value {
    fn from(node: ObjectRef) -> Self {
        Value::Object(node)
    }
}

impl From<ArrayRef> for Value {
    fn from(node: ArrayRef) -> Self {
        Value::Array(node)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items),
            serde_json::Value::Object(map) => Value::object(map),
        }
    }
}
