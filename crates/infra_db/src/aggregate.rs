//! Read-only aggregation pipelines
//!
//! A pipeline is an ordered list of stages run over the rendered documents of
//! one collection. Stores push as much of a pipeline down to their own query
//! engine as they can (at least a leading [`Stage::Match`]) and evaluate the
//! rest in process with [`run_stages`], so every store produces the same
//! result documents.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Timelike;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use core_kernel::temporal::parse_timestamp;

use crate::document::{get_path, is_valid_path, set_path, Body, ID_FIELD};
use crate::error::{DatabaseError, RepositoryError};
use crate::filter::{compare_by, compare_for_sort, validate_sort, Filter, SortField};

/// Calendar unit for date bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    /// Hour of the day, `0..=23`, as an integer
    HourOfDay,
    /// Calendar day as `YYYY-MM-DD`
    Day,
    /// Calendar month as `YYYY-MM`
    Month,
}

/// What documents are grouped by
#[derive(Debug, Clone, PartialEq)]
pub enum GroupKey {
    /// A single group over every document
    Null,
    Field(String),
    /// A timestamp field truncated to a calendar unit (UTC)
    DateBucket { path: String, unit: DateUnit },
}

/// Per-group reduction
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of numeric values; non-numeric values are ignored
    Sum(String),
    Count,
    Avg(String),
    Min(String),
    Max(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(Vec<SortField>),
    /// `(output field, source path)` pairs; only listed fields survive
    Project(Vec<(String, String)>),
    Skip(u64),
    Limit(u64),
}

/// An ordered aggregation pipeline
///
/// # Example
///
/// ```rust
/// use infra_db::aggregate::{Accumulator, DateUnit, GroupKey, Pipeline};
/// use infra_db::{Filter, SortField};
///
/// let pipeline = Pipeline::new()
///     .match_filter(Filter::gte("date", "2024-03-01T00:00:00.000Z"))
///     .group(
///         GroupKey::DateBucket { path: "date".into(), unit: DateUnit::Day },
///         vec![("totalAmount".into(), Accumulator::Sum("amount".into()))],
///     )
///     .sort(vec![SortField::asc("_id")])
///     .project(vec![("bucket".into(), "_id".into()), ("totalAmount".into(), "totalAmount".into())]);
/// assert_eq!(pipeline.stages().len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn match_filter(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn group(self, key: GroupKey, accumulators: Vec<(String, Accumulator)>) -> Self {
        self.stage(Stage::Group { key, accumulators })
    }

    pub fn sort(self, sort: Vec<SortField>) -> Self {
        self.stage(Stage::Sort(sort))
    }

    pub fn project(self, fields: Vec<(String, String)>) -> Self {
        self.stage(Stage::Project(fields))
    }

    pub fn skip(self, n: u64) -> Self {
        self.stage(Stage::Skip(n))
    }

    pub fn limit(self, n: u64) -> Self {
        self.stage(Stage::Limit(n))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Splits off a leading match stage so a store can evaluate it natively
    pub fn split_leading_match(&self) -> (Filter, &[Stage]) {
        match self.stages.split_first() {
            Some((Stage::Match(filter), rest)) => (filter.clone(), rest),
            _ => (Filter::All, &self.stages),
        }
    }

    /// Checks every path and output name in the pipeline
    pub fn validate(&self) -> Result<(), RepositoryError> {
        for stage in &self.stages {
            match stage {
                Stage::Match(filter) => filter.validate()?,
                Stage::Group { key, accumulators } => {
                    match key {
                        GroupKey::Null => {}
                        GroupKey::Field(path) | GroupKey::DateBucket { path, .. } => {
                            check_path(path, "group key")?
                        }
                    }
                    for (name, accumulator) in accumulators {
                        if name.is_empty() || name.contains('.') || name == ID_FIELD {
                            return Err(RepositoryError::invalid_argument(format!(
                                "invalid accumulator name '{}'",
                                name
                            )));
                        }
                        match accumulator {
                            Accumulator::Count => {}
                            Accumulator::Sum(path)
                            | Accumulator::Avg(path)
                            | Accumulator::Min(path)
                            | Accumulator::Max(path) => check_path(path, "accumulator")?,
                        }
                    }
                }
                Stage::Sort(sort) => validate_sort(sort)?,
                Stage::Project(fields) => {
                    for (output, source) in fields {
                        check_path(output, "projection output")?;
                        check_path(source, "projection source")?;
                    }
                }
                Stage::Skip(_) | Stage::Limit(_) => {}
            }
        }
        Ok(())
    }

    /// Runs every stage over `documents`
    pub fn run(&self, documents: Vec<Body>) -> Result<Vec<Value>, DatabaseError> {
        run_stages(&self.stages, documents)
    }
}

fn check_path(path: &str, context: &str) -> Result<(), RepositoryError> {
    if is_valid_path(path) {
        Ok(())
    } else {
        Err(RepositoryError::invalid_argument(format!(
            "malformed {} path '{}'",
            context, path
        )))
    }
}

/// Runs a slice of stages over rendered documents
pub fn run_stages(stages: &[Stage], mut documents: Vec<Body>) -> Result<Vec<Value>, DatabaseError> {
    for stage in stages {
        documents = match stage {
            Stage::Match(filter) => documents
                .into_iter()
                .filter(|doc| filter.matches_body(doc))
                .collect(),
            Stage::Group { key, accumulators } => group(documents, key, accumulators)?,
            Stage::Sort(sort) => {
                documents.sort_by(|a, b| compare_by(sort, a, b));
                documents
            }
            Stage::Project(fields) => documents
                .iter()
                .map(|doc| project(doc, fields))
                .collect::<Result<_, _>>()?,
            Stage::Skip(n) => documents.into_iter().skip(to_usize(*n)).collect(),
            Stage::Limit(n) => documents.into_iter().take(to_usize(*n)).collect(),
        };
    }
    Ok(documents.into_iter().map(Value::Object).collect())
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

fn project(doc: &Body, fields: &[(String, String)]) -> Result<Body, DatabaseError> {
    let mut projected = Body::new();
    for (output, source) in fields {
        if let Some(value) = get_path(doc, source) {
            set_path(&mut projected, output, value.clone())?;
        }
    }
    Ok(projected)
}

fn group_key(doc: &Body, key: &GroupKey) -> Result<Value, DatabaseError> {
    match key {
        GroupKey::Null => Ok(Value::Null),
        GroupKey::Field(path) => Ok(get_path(doc, path).cloned().unwrap_or(Value::Null)),
        GroupKey::DateBucket { path, unit } => match get_path(doc, path) {
            None | Some(Value::Null) => Ok(Value::Null),
            Some(Value::String(raw)) => {
                let at = parse_timestamp(raw).map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
                Ok(match unit {
                    DateUnit::HourOfDay => Value::from(at.hour()),
                    DateUnit::Day => Value::String(at.format("%Y-%m-%d").to_string()),
                    DateUnit::Month => Value::String(at.format("%Y-%m").to_string()),
                })
            }
            Some(other) => Err(DatabaseError::QueryFailed(format!(
                "can't convert {} at '{}' to a date",
                other, path
            ))),
        },
    }
}

#[derive(Debug)]
enum AccState {
    Sum(Decimal),
    Count(u64),
    Avg { total: Decimal, n: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl AccState {
    fn new(accumulator: &Accumulator) -> Self {
        match accumulator {
            Accumulator::Sum(_) => AccState::Sum(Decimal::ZERO),
            Accumulator::Count => AccState::Count(0),
            Accumulator::Avg(_) => AccState::Avg { total: Decimal::ZERO, n: 0 },
            Accumulator::Min(_) => AccState::Min(None),
            Accumulator::Max(_) => AccState::Max(None),
        }
    }

    fn feed(&mut self, accumulator: &Accumulator, doc: &Body) -> Result<(), DatabaseError> {
        let field = |path: &str| get_path(doc, path).filter(|v| !v.is_null());
        match (self, accumulator) {
            (AccState::Sum(total), Accumulator::Sum(path)) => {
                if let Some(n) = field(path).and_then(to_decimal) {
                    *total = checked_total(*total, n, path)?;
                }
            }
            (AccState::Count(n), Accumulator::Count) => *n += 1,
            (AccState::Avg { total, n }, Accumulator::Avg(path)) => {
                if let Some(value) = field(path).and_then(to_decimal) {
                    *total = checked_total(*total, value, path)?;
                    *n += 1;
                }
            }
            (AccState::Min(current), Accumulator::Min(path)) => {
                if let Some(value) = field(path) {
                    if current.as_ref().map_or(true, |c| compare_for_sort(Some(value), Some(c)).is_lt()) {
                        *current = Some(value.clone());
                    }
                }
            }
            (AccState::Max(current), Accumulator::Max(path)) => {
                if let Some(value) = field(path) {
                    if current.as_ref().map_or(true, |c| compare_for_sort(Some(value), Some(c)).is_gt()) {
                        *current = Some(value.clone());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            AccState::Sum(total) => decimal_to_value(total),
            AccState::Count(n) => Value::from(n),
            AccState::Avg { total, n } => {
                if n == 0 {
                    Value::Null
                } else {
                    decimal_to_value(total / Decimal::from(n))
                }
            }
            AccState::Min(value) | AccState::Max(value) => value.unwrap_or(Value::Null),
        }
    }
}

fn group(
    documents: Vec<Body>,
    key: &GroupKey,
    accumulators: &[(String, Accumulator)],
) -> Result<Vec<Body>, DatabaseError> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Value, Vec<AccState>)> = Vec::new();

    for doc in &documents {
        let key_value = group_key(doc, key)?;
        let slot = *index.entry(key_value.to_string()).or_insert_with(|| {
            groups.push((
                key_value.clone(),
                accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect(),
            ));
            groups.len() - 1
        });
        for (state, (_, accumulator)) in groups[slot].1.iter_mut().zip(accumulators) {
            state.feed(accumulator, doc)?;
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key_value, states)| {
            let mut out = Body::new();
            out.insert(ID_FIELD.to_string(), key_value);
            for ((name, _), state) in accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect())
}

fn checked_total(total: Decimal, value: Decimal, path: &str) -> Result<Decimal, DatabaseError> {
    total
        .checked_add(value)
        .ok_or_else(|| DatabaseError::QueryFailed(format!("sum of '{}' overflowed", path)))
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    let Value::Number(number) = value else {
        return None;
    };
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .or_else(|| number.as_f64().and_then(Decimal::from_f64))
}

fn decimal_to_value(value: Decimal) -> Value {
    let normalized = value.normalize();
    if normalized.scale() == 0 {
        if let Some(int) = normalized.to_i64() {
            return Value::from(int);
        }
    }
    normalized
        .to_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Body> {
        values.into_iter().map(|v| v.as_object().cloned().unwrap()).collect()
    }

    #[test]
    fn test_group_by_hour_sums_amounts() {
        let input = docs(vec![
            json!({ "amount": 10, "date": "2024-03-01T09:15:00.000Z" }),
            json!({ "amount": 5.5, "date": "2024-03-01T09:45:00.000Z" }),
            json!({ "amount": 7, "date": "2024-03-01T08:00:00.000Z" }),
        ]);
        let pipeline = Pipeline::new()
            .group(
                GroupKey::DateBucket { path: "date".into(), unit: DateUnit::HourOfDay },
                vec![("totalAmount".into(), Accumulator::Sum("amount".into()))],
            )
            .sort(vec![SortField::asc("_id")])
            .project(vec![("bucket".into(), "_id".into()), ("totalAmount".into(), "totalAmount".into())]);

        let out = pipeline.run(input).unwrap();
        assert_eq!(
            out,
            vec![json!({ "bucket": 8, "totalAmount": 7 }), json!({ "bucket": 9, "totalAmount": 15.5 })]
        );
    }

    #[test]
    fn test_sum_is_exact_for_decimals() {
        let input = docs(vec![json!({ "v": 0.1 }), json!({ "v": 0.2 })]);
        let out = Pipeline::new()
            .group(GroupKey::Null, vec![("total".into(), Accumulator::Sum("v".into()))])
            .run(input)
            .unwrap();
        assert_eq!(out[0]["total"], json!(0.3));
    }

    #[test]
    fn test_sum_overflow_is_an_error() {
        let input = docs(vec![json!({ "amount": 7e28 }), json!({ "amount": 7e28 })]);
        let result = Pipeline::new()
            .group(GroupKey::Null, vec![("total".into(), Accumulator::Sum("amount".into()))])
            .run(input.clone());
        assert!(matches!(result, Err(DatabaseError::QueryFailed(ref msg)) if msg.contains("amount")));

        let result = Pipeline::new()
            .group(GroupKey::Null, vec![("avg".into(), Accumulator::Avg("amount".into()))])
            .run(input);
        assert!(matches!(result, Err(DatabaseError::QueryFailed(_))));
    }

    #[test]
    fn test_count_avg_min_max() {
        let input = docs(vec![
            json!({ "user": "a", "amount": 1 }),
            json!({ "user": "a", "amount": 3 }),
            json!({ "user": "b", "amount": 10 }),
            json!({ "user": "b" }),
        ]);
        let out = Pipeline::new()
            .group(
                GroupKey::Field("user".into()),
                vec![
                    ("n".into(), Accumulator::Count),
                    ("avg".into(), Accumulator::Avg("amount".into())),
                    ("min".into(), Accumulator::Min("amount".into())),
                    ("max".into(), Accumulator::Max("amount".into())),
                ],
            )
            .sort(vec![SortField::asc("_id")])
            .run(input)
            .unwrap();
        assert_eq!(out[0], json!({ "_id": "a", "n": 2, "avg": 2, "min": 1, "max": 3 }));
        assert_eq!(out[1], json!({ "_id": "b", "n": 2, "avg": 10, "min": 10, "max": 10 }));
    }

    #[test]
    fn test_match_skip_limit() {
        let input = docs((0..10).map(|i| json!({ "i": i })).collect());
        let out = Pipeline::new()
            .match_filter(Filter::gte("i", 3))
            .skip(2)
            .limit(3)
            .run(input)
            .unwrap();
        assert_eq!(out, vec![json!({ "i": 5 }), json!({ "i": 6 }), json!({ "i": 7 })]);
    }

    #[test]
    fn test_split_leading_match() {
        let pipeline = Pipeline::new().match_filter(Filter::eq("a", 1)).limit(1);
        let (filter, rest) = pipeline.split_leading_match();
        assert_eq!(filter, Filter::eq("a", 1));
        assert_eq!(rest, &[Stage::Limit(1)]);

        let no_match = Pipeline::new().limit(1);
        assert_eq!(no_match.split_leading_match().0, Filter::All);
    }

    #[test]
    fn test_non_date_bucket_is_an_error() {
        let input = docs(vec![json!({ "date": 12 })]);
        let result = Pipeline::new()
            .group(GroupKey::DateBucket { path: "date".into(), unit: DateUnit::Day }, vec![])
            .run(input);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_accumulator_names() {
        let pipeline = Pipeline::new().group(GroupKey::Null, vec![("a.b".into(), Accumulator::Count)]);
        assert!(pipeline.validate().is_err());
    }
}
