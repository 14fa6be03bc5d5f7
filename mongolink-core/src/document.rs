// mongolink-core/src/document.rs
//! Command and reply documents
//!
//! Documents are ordered JSON objects. Ordering matters: the server reads the
//! command name from the first key, so the `preserve_order` feature of
//! serde_json is required.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{OperationError, Result};

/// Ordered document (command, reply, descriptor)
pub type Document = Map<String, Value>;

/// Build a [`Document`] with `json!` object syntax.
///
/// ```
/// use mongolink_core::doc;
///
/// let cmd = doc! { "listCollections": 1, "filter": { "name": "users" } };
/// assert_eq!(cmd.keys().next().map(String::as_str), Some("listCollections"));
/// assert!(doc! {}.is_empty());
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::Document::new()
    };
    ($($tt:tt)+) => {
        match $crate::__serde_json::json!({ $($tt)+ }) {
            $crate::__serde_json::Value::Object(map) => map,
            _ => unreachable!("object literal always yields an object"),
        }
    };
}

/// Convert an arbitrary JSON value into a document
pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(OperationError::InvalidArgument(format!(
            "expected a document, got {}",
            type_name(&other)
        ))),
    }
}

/// Parse a JSON string into a document
pub fn parse_document(json: &str) -> Result<Document> {
    let value: Value = serde_json::from_str(json)?;
    into_document(value)
}

/// The command name is the first key of a command document
pub fn command_name(command: &Document) -> Option<&str> {
    command.keys().next().map(String::as_str)
}

/// Get a value with dot notation support
///
/// Supports nested objects ("options.capped") and array indexing
/// ("cursor.firstBatch.0.name").
///
/// ```
/// use mongolink_core::doc;
/// use mongolink_core::document::get_path;
///
/// let reply = doc! { "cursor": { "firstBatch": [ { "name": "users" } ] } };
/// assert_eq!(get_path(&reply, "cursor.firstBatch.0.name").unwrap(), "users");
/// assert!(get_path(&reply, "cursor.nextBatch").is_none());
/// ```
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut value = doc.get(parts.next()?)?;

    for part in parts {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => value = arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(value)
}

pub fn get_str<'a>(doc: &'a Document, path: &str) -> Option<&'a str> {
    get_path(doc, path).and_then(Value::as_str)
}

pub fn get_i64(doc: &Document, path: &str) -> Option<i64> {
    get_path(doc, path).and_then(Value::as_i64)
}

pub fn get_document<'a>(doc: &'a Document, path: &str) -> Option<&'a Document> {
    get_path(doc, path).and_then(Value::as_object)
}

pub fn get_array<'a>(doc: &'a Document, path: &str) -> Option<&'a Vec<Value>> {
    get_path(doc, path).and_then(Value::as_array)
}

/// Compare two JSON values
///
/// Numbers compare numerically, strings lexicographically, booleans false < true.
/// Mixed types are not comparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => n1.as_f64()?.partial_cmp(&n2.as_f64()?),
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

/// Equality that treats `1` and `1.0` as the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
