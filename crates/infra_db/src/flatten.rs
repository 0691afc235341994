//! Flattening of nested payloads into dotted field paths
//!
//! Create and update payloads are applied path by path, so a nested partial
//! update such as `{ "address": { "city": "Pune" } }` only touches
//! `address.city` and leaves the rest of `address` alone.
//!
//! Only *plain* objects are descended into. A JSON object is plain unless one
//! of its keys starts with `$`; objects like `{ "$date": ... }` or
//! `{ "$oid": ... }` stand for typed values and are kept whole. Arrays,
//! scalars and `null` are always leaves.

use serde_json::{Map, Value};

use crate::document::{set_path, Body};
use crate::error::DatabaseError;

/// Returns true when `value` is a bare key/value container
pub fn is_plain_object(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.keys().any(|key| key.starts_with('$')),
        _ => false,
    }
}

/// Rewrites `object` so every leaf is keyed by its full dotted path
///
/// Empty plain objects contribute no paths. Flattening an already flat
/// object returns it unchanged.
///
/// # Example
///
/// ```rust
/// use infra_db::flatten::flatten;
/// use serde_json::json;
///
/// let nested = json!({ "a": { "b": 1, "c": { "d": 2 } } });
/// let flat = flatten(nested.as_object().unwrap());
/// assert_eq!(serde_json::Value::Object(flat), json!({ "a.b": 1, "a.c.d": 2 }));
/// ```
pub fn flatten(object: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    let mut prefix = Vec::new();
    flatten_into(object, &mut prefix, &mut flat);
    flat
}

fn flatten_into<'a>(
    object: &'a Map<String, Value>,
    prefix: &mut Vec<&'a str>,
    flat: &mut Map<String, Value>,
) {
    for (key, value) in object {
        prefix.push(key);
        match value {
            Value::Object(nested) if is_plain_object(value) => flatten_into(nested, prefix, flat),
            leaf => {
                flat.insert(prefix.join("."), leaf.clone());
            }
        }
        prefix.pop();
    }
}

/// Applies flattened paths onto `target`, overwriting only those paths
pub fn apply_paths(target: &mut Body, flat: &Map<String, Value>) -> Result<(), DatabaseError> {
    for (path, value) in flat {
        set_path(target, path, value.clone())?;
    }
    Ok(())
}

/// Rebuilds a nested object from dotted paths
pub fn unflatten(flat: &Map<String, Value>) -> Result<Body, DatabaseError> {
    let mut nested = Body::new();
    apply_paths(&mut nested, flat)?;
    Ok(nested)
}
