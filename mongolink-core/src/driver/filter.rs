// mongolink-core/src/driver/filter.rs
//! Query filter matching for the in-memory server
//!
//! Used for `listCollections` filters, `count` queries and collection
//! validators. Supported:
//!
//! - equality on dotted paths (arrays match if any element is equal)
//! - comparison: `$eq $ne $gt $gte $lt $lte $in $nin`
//! - element: `$exists`
//! - evaluation: `$regex` with optional `$options` (i, m, s, x)
//! - logical (top level): `$and $or $nor`
//!
//! Errors are plain messages; the server turns them into BadValue replies.

use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

use crate::document::{compare_values, get_path, values_equal, Document};

pub type FilterResult<T> = std::result::Result<T, String>;

/// Check whether `doc` matches `filter` (empty filter matches everything)
pub fn matches_filter(doc: &Document, filter: &Document) -> FilterResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches_filter(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches_filter(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in sub_filters(key, condition)? {
                    if matches_filter(doc, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(format!("unknown top level operator: {}", op));
            }
            path => matches_condition(get_path(doc, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, condition: &'a Value) -> FilterResult<Vec<&'a Document>> {
    let entries = condition
        .as_array()
        .filter(|arr| !arr.is_empty())
        .ok_or_else(|| format!("{} must be a nonempty array", op))?;

    entries
        .iter()
        .map(|entry| {
            entry
                .as_object()
                .ok_or_else(|| format!("{} entries must be objects", op))
        })
        .collect()
}

fn is_operator_object(condition: &Value) -> Option<&Document> {
    let obj = condition.as_object()?;
    if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) {
        Some(obj)
    } else {
        None
    }
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> FilterResult<bool> {
    let operators = match is_operator_object(condition) {
        Some(ops) => ops,
        None => return Ok(equals(value, condition)),
    };

    for (op, arg) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, arg),
            "$ne" => !equals(value, arg),
            "$gt" => compares(value, arg, |o| o == Ordering::Greater),
            "$gte" => compares(value, arg, |o| o != Ordering::Less),
            "$lt" => compares(value, arg, |o| o == Ordering::Less),
            "$lte" => compares(value, arg, |o| o != Ordering::Greater),
            "$in" => in_list(op, value, arg)?,
            "$nin" => !in_list(op, value, arg)?,
            "$exists" => value.is_some() == truthy(arg),
            "$regex" => {
                let options = operators.get("$options").and_then(Value::as_str).unwrap_or("");
                regex_matches(value, arg, options)?
            }
            "$options" => {
                if !operators.contains_key("$regex") {
                    return Err("$options needs a $regex".to_string());
                }
                true
            }
            other => return Err(format!("unknown operator: {}", other)),
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(value: Option<&Value>, target: &Value) -> bool {
    match value {
        None => target.is_null(),
        Some(Value::Array(items)) if !target.is_array() => {
            items.iter().any(|item| values_equal(item, target))
        }
        Some(v) => values_equal(v, target),
    }
}

fn compares(value: Option<&Value>, target: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|v| compare_values(v, target))
        .map(pred)
        .unwrap_or(false)
}

fn in_list(op: &str, value: Option<&Value>, arg: &Value) -> FilterResult<bool> {
    let candidates = arg
        .as_array()
        .ok_or_else(|| format!("{} needs an array", op))?;
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn truthy(arg: &Value) -> bool {
    match arg {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Null => false,
        _ => true,
    }
}

fn regex_matches(value: Option<&Value>, pattern: &Value, options: &str) -> FilterResult<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| "$regex has to be a string".to_string())?;

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| format!("invalid regex '{}': {}", pattern, e))?;

    Ok(match value {
        Some(Value::String(s)) => regex.is_match(s),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().map(|s| regex.is_match(s)).unwrap_or(false)),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn descriptor() -> Document {
        doc! {
            "name": "events",
            "type": "collection",
            "options": { "capped": true, "size": 4096 },
            "tags": ["hot", "ops"]
        }
    }

    #[test]
    fn test_empty_filter_matches() {
        assert!(matches_filter(&descriptor(), &doc! {}).unwrap());
    }

    #[test]
    fn test_equality_and_paths() {
        let d = descriptor();
        assert!(matches_filter(&d, &doc! { "name": "events" }).unwrap());
        assert!(!matches_filter(&d, &doc! { "name": "users" }).unwrap());
        assert!(matches_filter(&d, &doc! { "options.capped": true }).unwrap());
        assert!(matches_filter(&d, &doc! { "tags": "ops" }).unwrap());
        assert!(matches_filter(&d, &doc! { "missing": null }).unwrap());
    }

    #[test]
    fn test_comparison_operators() {
        let d = descriptor();
        assert!(matches_filter(&d, &doc! { "options.size": { "$gte": 4096 } }).unwrap());
        assert!(!matches_filter(&d, &doc! { "options.size": { "$gt": 4096 } }).unwrap());
        assert!(matches_filter(&d, &doc! { "options.size": { "$lt": 5000, "$gt": 1 } }).unwrap());
        assert!(matches_filter(&d, &doc! { "name": { "$in": ["a", "events"] } }).unwrap());
        assert!(matches_filter(&d, &doc! { "name": { "$nin": ["a", "b"] } }).unwrap());
        assert!(matches_filter(&d, &doc! { "name": { "$ne": "users" } }).unwrap());
        assert!(matches_filter(&d, &doc! { "options.max": { "$exists": false } }).unwrap());
        assert!(!matches_filter(&d, &doc! { "options": { "$exists": 0 } }).unwrap());
    }

    #[test]
    fn test_regex() {
        let d = descriptor();
        assert!(matches_filter(&d, &doc! { "name": { "$regex": "^ev" } }).unwrap());
        assert!(matches_filter(&d, &doc! { "name": { "$regex": "^EV", "$options": "i" } }).unwrap());
        assert!(!matches_filter(&d, &doc! { "name": { "$regex": "^EV" } }).unwrap());
        assert!(matches_filter(&d, &doc! { "name": { "$regex": "(" } }).is_err());
        assert!(matches_filter(&d, &doc! { "name": { "$options": "i" } }).is_err());
    }

    #[test]
    fn test_logical_operators() {
        let d = descriptor();
        assert!(matches_filter(&d, &doc! { "$or": [ { "name": "x" }, { "name": "events" } ] }).unwrap());
        assert!(!matches_filter(&d, &doc! { "$and": [ { "name": "events" }, { "type": "view" } ] }).unwrap());
        assert!(matches_filter(&d, &doc! { "$nor": [ { "type": "view" } ] }).unwrap());
        assert!(matches_filter(&d, &doc! { "$or": [] }).is_err());
        assert!(matches_filter(&d, &doc! { "$xor": [ { "a": 1 } ] }).is_err());
        assert!(matches_filter(&d, &doc! { "name": { "$near": 1 } }).is_err());
    }
}
