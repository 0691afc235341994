//! Query conditions, sort specifications and field projections
//!
//! Conditions are written against the rendered document (see
//! [`Document::to_value`](crate::document::Document::to_value)), so the
//! store-owned fields `_id`, `createdAt` and `updatedAt` can be filtered and
//! sorted on like any body field.
//!
//! Value semantics, shared by every store:
//! - equality treats numerically equal numbers as equal (`1 == 1.0`);
//! - range comparisons only match when both sides are numbers or both are
//!   strings; a missing field never matches a range;
//! - `Ne` matches documents where the field is missing;
//! - sort order follows PostgreSQL's `jsonb` ordering
//!   (missing < null < string < number < boolean < array < object).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::RecordId;

use crate::document::{get_path, is_valid_path, remove_path, set_path, Body, Document, ID_FIELD};
use crate::error::{DatabaseError, RepositoryError};

/// A condition selecting a subset of a collection
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Matches every document. Passed to a bulk delete this removes the
    /// whole collection.
    #[default]
    All,
    Id(RecordId),
    IdIn(Vec<RecordId>),
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Exists(String, bool),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(path.into(), value.into())
    }

    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(path.into(), value.into())
    }

    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gt(path.into(), value.into())
    }

    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(path.into(), value.into())
    }

    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(path.into(), value.into())
    }

    pub fn lte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lte(path.into(), value.into())
    }

    pub fn is_in(path: impl Into<String>, values: Vec<Value>) -> Self {
        Filter::In(path.into(), values)
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Filter::Exists(path.into(), true)
    }

    /// Combines two conditions, flattening nested conjunctions
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) | (other, Filter::All) => other,
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Checks every field path in the condition
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first malformed path
    pub fn validate(&self) -> Result<(), RepositoryError> {
        match self {
            Filter::All | Filter::Id(_) | Filter::IdIn(_) => Ok(()),
            Filter::Eq(path, _)
            | Filter::Ne(path, _)
            | Filter::Gt(path, _)
            | Filter::Gte(path, _)
            | Filter::Lt(path, _)
            | Filter::Lte(path, _)
            | Filter::In(path, _)
            | Filter::Exists(path, _) => {
                if is_valid_path(path) {
                    Ok(())
                } else {
                    Err(RepositoryError::invalid_argument(format!(
                        "malformed field path '{}' in filter",
                        path
                    )))
                }
            }
            Filter::And(filters) | Filter::Or(filters) => {
                filters.iter().try_for_each(Filter::validate)
            }
        }
    }

    /// Evaluates the condition against a document
    pub fn matches(&self, document: &Document) -> bool {
        match document.to_value() {
            Value::Object(rendered) => self.matches_body(&rendered),
            _ => false,
        }
    }

    /// Evaluates the condition against an already rendered document
    pub fn matches_body(&self, rendered: &Body) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => rendered_id(rendered) == Some(*id),
            Filter::IdIn(ids) => rendered_id(rendered).is_some_and(|id| ids.contains(&id)),
            Filter::Eq(path, expected) => get_path(rendered, path)
                .is_some_and(|actual| values_equal(actual, expected)),
            Filter::Ne(path, expected) => !get_path(rendered, path)
                .is_some_and(|actual| values_equal(actual, expected)),
            Filter::Gt(path, bound) => range_matches(rendered, path, bound, |o| o.is_gt()),
            Filter::Gte(path, bound) => range_matches(rendered, path, bound, |o| o.is_ge()),
            Filter::Lt(path, bound) => range_matches(rendered, path, bound, |o| o.is_lt()),
            Filter::Lte(path, bound) => range_matches(rendered, path, bound, |o| o.is_le()),
            Filter::In(path, candidates) => get_path(rendered, path).is_some_and(|actual| {
                candidates.iter().any(|candidate| values_equal(actual, candidate))
            }),
            Filter::Exists(path, expected) => get_path(rendered, path).is_some() == *expected,
            Filter::And(filters) => filters.iter().all(|f| f.matches_body(rendered)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches_body(rendered)),
        }
    }
}

fn rendered_id(rendered: &Body) -> Option<RecordId> {
    rendered
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| RecordId::parse(raw).ok())
}

fn range_matches(rendered: &Body, path: &str, bound: &Value, accept: fn(Ordering) -> bool) -> bool {
    get_path(rendered, path)
        .and_then(|actual| compare_scalars(actual, bound))
        .is_some_and(accept)
}

/// Equality with numeric normalization
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// Orders two values of the same scalar kind (number/number or string/string)
pub(crate) fn compare_scalars(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::Bool(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

/// Total order used for sorting, missing fields first
pub(crate) fn compare_for_sort(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    type_rank(left).cmp(&type_rank(right)).then_with(|| match (left, right) {
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => compare_scalars(a, b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    })
}

/// Sort direction for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One entry of an ordered sort specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub path: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Compares two rendered documents under an ordered sort specification
pub(crate) fn compare_by(sort: &[SortField], left: &Body, right: &Body) -> Ordering {
    for field in sort {
        let ordering = compare_for_sort(get_path(left, &field.path), get_path(right, &field.path));
        let ordering = match field.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub(crate) fn validate_sort(sort: &[SortField]) -> Result<(), RepositoryError> {
    match sort.iter().find(|field| !is_valid_path(&field.path)) {
        Some(field) => Err(RepositoryError::invalid_argument(format!(
            "malformed sort path '{}'",
            field.path
        ))),
        None => Ok(()),
    }
}

/// Field selection applied to fetched documents
///
/// Store-owned fields are always returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Return only these body paths
    Include(Vec<String>),
    /// Return everything except these body paths
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Include(paths.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Exclude(paths.into_iter().map(Into::into).collect())
    }

    fn paths(&self) -> &[String] {
        match self {
            Projection::Include(paths) | Projection::Exclude(paths) => paths,
        }
    }

    pub fn validate(&self) -> Result<(), RepositoryError> {
        match self.paths().iter().find(|path| !is_valid_path(path)) {
            Some(path) => Err(RepositoryError::invalid_argument(format!(
                "malformed projection path '{}'",
                path
            ))),
            None => Ok(()),
        }
    }

    /// Returns a copy of `document` restricted to the selected fields
    pub fn apply(&self, document: &Document) -> Result<Document, DatabaseError> {
        let body = match self {
            Projection::Include(paths) => {
                let mut selected = Body::new();
                for path in paths {
                    if let Some(value) = get_path(&document.body, path) {
                        set_path(&mut selected, path, value.clone())?;
                    }
                }
                selected
            }
            Projection::Exclude(paths) => {
                let mut remaining = document.body.clone();
                for path in paths {
                    remove_path(&mut remaining, path);
                }
                remaining
            }
        };
        Ok(Document {
            body,
            ..document.clone()
        })
    }
}
