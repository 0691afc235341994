//! Stored documents and dotted field paths
//!
//! A document is a JSON object body plus the fields the store owns: the
//! identifier and the creation/update timestamps. Queries, projections and
//! aggregation pipelines see the rendered form from [`Document::to_value`],
//! where those store-owned fields appear as `_id`, `createdAt` and
//! `updatedAt` next to the body's own keys.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use core_kernel::temporal::{format_timestamp, timestamp};
use core_kernel::RecordId;

use crate::error::DatabaseError;

/// JSON object holding a document's own fields
pub type Body = Map<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Field names the store assigns; payloads may not write them
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// An untyped stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: RecordId,
    pub body: Body,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a freshly inserted document stamped with `now`
    pub fn new(body: Body, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            body,
            created_at: now,
            updated_at: now,
        }
    }

    /// Renders the body with the store-owned fields merged in
    pub fn to_value(&self) -> Value {
        let mut rendered = self.body.clone();
        rendered.insert(ID_FIELD.to_string(), Value::String(self.id.as_uuid().to_string()));
        rendered.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        rendered.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        Value::Object(rendered)
    }

    /// Decodes into a typed record
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Record<T>, DatabaseError> {
        serde_json::from_value(self.to_value()).map_err(DatabaseError::from)
    }
}

/// A typed record as returned by the repository engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<T> {
    #[serde(rename = "_id")]
    pub id: RecordId,
    #[serde(flatten)]
    pub data: T,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl<T> std::ops::Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

/// Returns true when `path` is a well-formed dotted path
///
/// Segments must be non-empty and may not start with `$`.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .split('.')
            .all(|segment| !segment.is_empty() && !segment.starts_with('$'))
}

/// Returns true when the first segment of `path` names a store-owned field
pub fn is_reserved_path(path: &str) -> bool {
    let head = path.split('.').next().unwrap_or(path);
    RESERVED_FIELDS.contains(&head)
}

/// Looks up the value at a dotted path
pub fn get_path<'a>(root: &'a Body, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes `value` at a dotted path, creating missing intermediate objects
///
/// Fails when an intermediate segment already holds a non-object value:
/// a field cannot be created inside a scalar or an array.
pub fn set_path(root: &mut Body, path: &str, value: Value) -> Result<(), DatabaseError> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| DatabaseError::ConstraintViolation("empty field path".to_string()))?;

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match slot {
            Value::Object(map) => map,
            _ => {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "cannot create field '{}' in non-object element '{}'",
                    segments[depth + 1..].join("."),
                    segments[..=depth].join(".")
                )))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Removes the value at a dotted path, returning it if present
pub fn remove_path(root: &mut Body, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = segments.split_last()?;
    let mut current = root;
    for segment in parents {
        current = current.get_mut(*segment)?.as_object_mut()?;
    }
    current.remove(*last)
}
