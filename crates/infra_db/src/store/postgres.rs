//! PostgreSQL document store
//!
//! Every collection shares one table:
//!
//! ```sql
//! documents(collection TEXT, id UUID, body JSONB, created_at, updated_at)
//! ```
//!
//! Filters and sorts are translated to SQL over `jsonb` expressions. Field
//! paths are bound as `text[]` parameters and read with `body #> $n`; the
//! store-owned fields map to their columns, rendered to the same `jsonb`
//! values the in-memory store sees. Queries are built at runtime with
//! [`sqlx::QueryBuilder`], so no database is needed at compile time.
//!
//! Aggregations of the form `[match] group [sort] [project]` run as a single
//! grouped query; any stages after that prefix, or pipelines of another
//! shape, are evaluated in process over the query's output.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use core_kernel::temporal::now_millis;
use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, RecordId};

use super::{render, DocumentStore, FindQuery};
use crate::aggregate::{run_stages, Accumulator, DateUnit, GroupKey, Pipeline, Stage};
use crate::document::{Body, Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use crate::error::DatabaseError;
use crate::filter::{Filter, SortDirection, SortField};
use crate::flatten::apply_paths;
use crate::pool::run_migrations;

const ADAPTER_ID: &str = "postgres-document-store";

/// Canonical timestamp rendering, matching `format_timestamp`
const TIMESTAMP_FORMAT: &str = r#"'YYYY-MM-DD"T"HH24:MI:SS.MS"Z"'"#;

/// PostgreSQL-backed [`DocumentStore`]
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending migrations, creating the `documents` table if needed
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        run_migrations(&self.pool).await
    }
}

/// Pushes a `jsonb` expression for the value at `path` in the rendered document
fn push_field(builder: &mut QueryBuilder<'_, Postgres>, path: &str) {
    match path {
        ID_FIELD => {
            builder.push("to_jsonb(id::text)");
        }
        CREATED_AT_FIELD => {
            builder.push(format!(
                "to_jsonb(to_char(created_at AT TIME ZONE 'UTC', {}))",
                TIMESTAMP_FORMAT
            ));
        }
        UPDATED_AT_FIELD => {
            builder.push(format!(
                "to_jsonb(to_char(updated_at AT TIME ZONE 'UTC', {}))",
                TIMESTAMP_FORMAT
            ));
        }
        _ => {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            builder.push("(body #> ");
            builder.push_bind(segments);
            builder.push(")");
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    builder.push_bind(Json(value.clone()));
    builder.push("::jsonb");
}

fn push_comparison(builder: &mut QueryBuilder<'_, Postgres>, path: &str, operator: &str, bound: &Value) {
    // Ranges only compare numbers with numbers and strings with strings
    let kind = match bound {
        Value::Number(_) => "number",
        Value::String(_) => "string",
        _ => {
            builder.push("FALSE");
            return;
        }
    };
    builder.push("(jsonb_typeof(");
    push_field(builder, path);
    builder.push(format!(") = '{}' AND ", kind));
    push_field(builder, path);
    builder.push(format!(" {} ", operator));
    push_value(builder, bound);
    builder.push(")");
}

/// Translates a filter into a SQL predicate
fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            builder.push("TRUE");
        }
        Filter::Id(id) => {
            builder.push("id = ");
            builder.push_bind(*id.as_uuid());
        }
        Filter::IdIn(ids) => {
            let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
            builder.push("id = ANY(");
            builder.push_bind(ids);
            builder.push(")");
        }
        Filter::Eq(path, expected) => {
            builder.push("(");
            push_field(builder, path);
            builder.push(" = ");
            push_value(builder, expected);
            builder.push(")");
        }
        Filter::Ne(path, expected) => {
            builder.push("(");
            push_field(builder, path);
            builder.push(" IS NULL OR ");
            push_field(builder, path);
            builder.push(" <> ");
            push_value(builder, expected);
            builder.push(")");
        }
        Filter::Gt(path, bound) => push_comparison(builder, path, ">", bound),
        Filter::Gte(path, bound) => push_comparison(builder, path, ">=", bound),
        Filter::Lt(path, bound) => push_comparison(builder, path, "<", bound),
        Filter::Lte(path, bound) => push_comparison(builder, path, "<=", bound),
        Filter::In(path, candidates) => {
            if candidates.is_empty() {
                builder.push("FALSE");
                return;
            }
            builder.push("(");
            push_field(builder, path);
            builder.push(" IN (");
            for (i, candidate) in candidates.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, candidate);
            }
            builder.push("))");
        }
        Filter::Exists(path, expected) => {
            builder.push("(");
            push_field(builder, path);
            builder.push(if *expected { " IS NOT NULL)" } else { " IS NULL)" });
        }
        Filter::And(filters) | Filter::Or(filters) => {
            let (joiner, empty) = match filter {
                Filter::And(_) => (" AND ", "TRUE"),
                _ => (" OR ", "FALSE"),
            };
            if filters.is_empty() {
                builder.push(empty);
                return;
            }
            builder.push("(");
            for (i, inner) in filters.iter().enumerate() {
                if i > 0 {
                    builder.push(joiner);
                }
                push_filter(builder, inner);
            }
            builder.push(")");
        }
    }
}

/// `WHERE collection = $1 AND <filter>`
fn push_where(builder: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    builder.push(" WHERE collection = ");
    builder.push_bind(collection.to_string());
    builder.push(" AND ");
    push_filter(builder, filter);
}

/// Orders like `jsonb` with missing fields first, then by insertion order
fn push_order(builder: &mut QueryBuilder<'_, Postgres>, sort: &[SortField]) {
    builder.push(" ORDER BY ");
    for field in sort {
        push_field(builder, &field.path);
        builder.push(match field.direction {
            SortDirection::Ascending => " ASC NULLS FIRST, ",
            SortDirection::Descending => " DESC NULLS LAST, ",
        });
    }
    builder.push("created_at ASC, id ASC");
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn row_to_document(row: &PgRow) -> Result<Document, DatabaseError> {
    let id: Uuid = row.try_get("id")?;
    let Json(body): Json<Body> = row.try_get("body")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(Document {
        id: RecordId::from_uuid(id),
        body,
        created_at,
        updated_at,
    })
}

/// Index name derived from collection and path; both must be plain identifiers
fn index_name(collection: &str, path: &str) -> Result<String, DatabaseError> {
    let plain = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if !plain(collection) || !path.split('.').all(plain) {
        return Err(DatabaseError::QueryFailed(format!(
            "cannot index '{}' on collection '{}'",
            path, collection
        )));
    }
    Ok(format!(
        "documents_{}_{}_idx",
        collection,
        path.replace('.', "_")
    ))
}

/// The prefix of a pipeline that runs as one grouped SQL query
#[derive(Debug)]
struct GroupedQuery<'a> {
    filter: Filter,
    key: &'a GroupKey,
    accumulators: &'a [(String, Accumulator)],
    sort: &'a [SortField],
    project: Option<&'a [(String, String)]>,
    /// Stages left for in-process evaluation
    rest: &'a [Stage],
}

impl<'a> GroupedQuery<'a> {
    fn plan(pipeline: &'a Pipeline) -> Option<Self> {
        let (filter, stages) = pipeline.split_leading_match();
        let (first, mut rest) = stages.split_first()?;
        let Stage::Group { key, accumulators } = first else {
            return None;
        };

        let mut sort: &[SortField] = &[];
        if let Some((Stage::Sort(fields), tail)) = rest.split_first() {
            sort = fields;
            rest = tail;
        }
        let mut project = None;
        if let Some((Stage::Project(fields), tail)) = rest.split_first() {
            // Nested outputs are built in process
            if fields.iter().all(|(output, _)| !output.contains('.')) {
                project = Some(fields.as_slice());
                rest = tail;
            }
        }

        Some(Self {
            filter,
            key,
            accumulators,
            sort,
            project,
            rest,
        })
    }
}

/// Scalar text of a `jsonb` field, for casts
fn push_text(builder: &mut QueryBuilder<'_, Postgres>, path: &str) {
    builder.push("(");
    push_field(builder, path);
    builder.push(" #>> '{}')");
}

/// The field as `numeric` when it holds a JSON number, otherwise NULL
fn push_number(builder: &mut QueryBuilder<'_, Postgres>, path: &str) {
    builder.push("CASE WHEN jsonb_typeof(");
    push_field(builder, path);
    builder.push(") = 'number' THEN ");
    push_text(builder, path);
    builder.push("::numeric END");
}

/// The field unless it is missing or JSON null
fn push_present(builder: &mut QueryBuilder<'_, Postgres>, path: &str) {
    builder.push("CASE WHEN jsonb_typeof(");
    push_field(builder, path);
    builder.push(") <> 'null' THEN ");
    push_field(builder, path);
    builder.push(" END");
}

fn push_group_key(builder: &mut QueryBuilder<'_, Postgres>, key: &GroupKey) {
    match key {
        GroupKey::Null => {
            builder.push("'null'::jsonb");
        }
        GroupKey::Field(path) => {
            builder.push("COALESCE(");
            push_field(builder, path);
            builder.push(", 'null'::jsonb)");
        }
        GroupKey::DateBucket { path, unit } => {
            builder.push("COALESCE(");
            let (open, close) = match unit {
                DateUnit::HourOfDay => ("to_jsonb(extract(hour FROM ", " AT TIME ZONE 'UTC')::int)"),
                DateUnit::Day => ("to_jsonb(to_char(", " AT TIME ZONE 'UTC', 'YYYY-MM-DD'))"),
                DateUnit::Month => ("to_jsonb(to_char(", " AT TIME ZONE 'UTC', 'YYYY-MM'))"),
            };
            builder.push(open);
            push_text(builder, path);
            builder.push("::timestamptz");
            builder.push(close);
            builder.push(", 'null'::jsonb)");
        }
    }
}

fn push_accumulator(builder: &mut QueryBuilder<'_, Postgres>, accumulator: &Accumulator) {
    match accumulator {
        Accumulator::Sum(path) => {
            builder.push("to_jsonb(COALESCE(trim_scale(SUM(");
            push_number(builder, path);
            builder.push(")), 0))");
        }
        Accumulator::Count => {
            builder.push("to_jsonb(COUNT(*))");
        }
        Accumulator::Avg(path) => {
            builder.push("to_jsonb(trim_scale(AVG(");
            push_number(builder, path);
            builder.push(")))");
        }
        Accumulator::Min(path) | Accumulator::Max(path) => {
            let direction = if matches!(accumulator, Accumulator::Min(_)) { "ASC" } else { "DESC" };
            builder.push("(array_agg(");
            push_present(builder, path);
            builder.push(" ORDER BY ");
            push_present(builder, path);
            builder.push(format!(" {} NULLS LAST))[1]", direction));
        }
    }
}

/// A field of the grouped output document
fn push_output_field(builder: &mut QueryBuilder<'_, Postgres>, path: &str) {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    builder.push("(doc #> ");
    builder.push_bind(segments);
    builder.push(")");
}

/// Builds the output object from `(output, source)` pairs, dropping missing sources
fn push_projection(builder: &mut QueryBuilder<'_, Postgres>, fields: &[(String, String)]) {
    if fields.is_empty() {
        builder.push("'{}'::jsonb");
        return;
    }
    builder.push("COALESCE((SELECT jsonb_object_agg(p.k, p.v) FROM (VALUES ");
    for (i, (output, source)) in fields.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push("(");
        builder.push_bind(output.clone());
        builder.push("::text, ");
        push_output_field(builder, source);
        builder.push(")");
    }
    builder.push(") AS p(k, v) WHERE p.v IS NOT NULL), '{}'::jsonb)");
}

/// Groups keep first-seen order unless sorted; sort ties fall back to it too
fn push_grouped_query(builder: &mut QueryBuilder<'_, Postgres>, collection: &str, plan: &GroupedQuery<'_>) {
    builder.push("SELECT ");
    match plan.project {
        Some(fields) => push_projection(builder, fields),
        None => {
            builder.push("doc");
        }
    }
    builder.push(" AS doc FROM (SELECT jsonb_build_object('_id', k");
    for (name, accumulator) in plan.accumulators {
        builder.push(", ");
        builder.push_bind(name.clone());
        builder.push("::text, ");
        push_accumulator(builder, accumulator);
    }
    builder.push(") AS doc, MIN(created_at) AS first_seen FROM (SELECT ");
    push_group_key(builder, plan.key);
    builder.push(" AS k, id, body, created_at, updated_at FROM documents");
    push_where(builder, collection, &plan.filter);
    builder.push(") src GROUP BY k) grouped ORDER BY ");
    for field in plan.sort {
        push_output_field(builder, &field.path);
        builder.push(match field.direction {
            SortDirection::Ascending => " ASC NULLS FIRST, ",
            SortDirection::Descending => " DESC NULLS LAST, ",
        });
    }
    builder.push("first_seen ASC");
}

const SELECT_COLUMNS: &str = "SELECT id, body, created_at, updated_at FROM documents";
const RETURNING_COLUMNS: &str = " RETURNING id, body, created_at, updated_at";

impl DomainPort for PostgresDocumentStore {}

#[async_trait]
impl HealthCheckable for PostgresDocumentStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID, latency_ms),
            Err(e) => {
                HealthCheckResult::unhealthy(ADAPTER_ID, latency_ms, format!("Database error: {}", e))
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self, filter))]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM documents");
        push_where(&mut builder, collection, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DatabaseError::from(&e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip(self, query), fields(skip = query.skip, limit = ?query.limit))]
    async fn fetch(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, DatabaseError> {
        let mut builder = QueryBuilder::new(SELECT_COLUMNS);
        push_where(&mut builder, collection, &query.filter);
        push_order(&mut builder, &query.sort);
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(to_i64(limit));
        }
        builder.push(" OFFSET ");
        builder.push_bind(to_i64(query.skip));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from(&e))?;
        debug!(fetched = rows.len(), "Fetched documents");

        rows.iter()
            .map(|row| {
                let document = row_to_document(row)?;
                match &query.projection {
                    Some(projection) => projection.apply(&document),
                    None => Ok(document),
                }
            })
            .collect()
    }

    #[instrument(skip(self, body))]
    async fn insert(&self, collection: &str, body: Body) -> Result<Document, DatabaseError> {
        let document = Document::new(body, now_millis());

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(collection)
        .bind(document.id.as_uuid())
        .bind(Json(&document.body))
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        debug!(id = %document.id, "Inserted document");
        Ok(document)
    }

    #[instrument(skip(self, fields), fields(id = %id, paths = fields.len()))]
    async fn set_fields(
        &self,
        collection: &str,
        id: RecordId,
        fields: &Body,
    ) -> Result<Document, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT body, created_at FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?
        .ok_or_else(|| DatabaseError::not_found(collection, id))?;

        let Json(mut body): Json<Body> = row.try_get("body")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        apply_paths(&mut body, fields)?;

        let row = sqlx::query(&format!(
            "UPDATE documents SET body = $3, updated_at = $4 WHERE collection = $1 AND id = $2{}",
            RETURNING_COLUMNS
        ))
        .bind(collection)
        .bind(id.as_uuid())
        .bind(Json(&body))
        .bind(now_millis().max(created_at))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        tx.commit().await?;
        row_to_document(&row)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn remove(&self, collection: &str, id: RecordId) -> Result<Option<Document>, DatabaseError> {
        let row = sqlx::query(&format!(
            "DELETE FROM documents WHERE collection = $1 AND id = $2{}",
            RETURNING_COLUMNS
        ))
        .bind(collection)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from(&e))?;

        row.as_ref().map(row_to_document).transpose()
    }

    #[instrument(skip(self, filter))]
    async fn remove_many(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError> {
        let mut builder = QueryBuilder::new("DELETE FROM documents");
        push_where(&mut builder, collection, filter);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from(&e))?;
        debug!(removed = result.rows_affected(), "Removed documents");
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.stages().len()))]
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>, DatabaseError> {
        let Some(plan) = GroupedQuery::plan(pipeline) else {
            let (filter, rest) = pipeline.split_leading_match();
            let documents = self.fetch(collection, &FindQuery::new(filter)).await?;
            return run_stages(rest, documents.iter().map(render).collect());
        };

        let mut builder = QueryBuilder::new("");
        push_grouped_query(&mut builder, collection, &plan);
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from(&e))?;
        debug!(groups = rows.len(), remaining = plan.rest.len(), "Grouped in SQL");

        let grouped = rows
            .iter()
            .map(|row| match row.try_get::<Json<Value>, _>("doc")? {
                Json(Value::Object(body)) => Ok(body),
                Json(other) => Err(DatabaseError::QueryFailed(format!(
                    "grouped row is not an object: {}",
                    other
                ))),
            })
            .collect::<Result<Vec<Body>, DatabaseError>>()?;
        run_stages(plan.rest, grouped)
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, collection: &str, path: &str) -> Result<(), DatabaseError> {
        let name = index_name(collection, path)?;
        let expression = match path {
            CREATED_AT_FIELD => "created_at".to_string(),
            UPDATED_AT_FIELD => "updated_at".to_string(),
            _ => format!("(body #> '{{{}}}')", path.replace('.', ",")),
        };
        let statement = format!(
            "CREATE INDEX IF NOT EXISTS {} ON documents ({}) WHERE collection = '{}'",
            name, expression, collection
        );

        sqlx::raw_sql(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from(&e))?;
        info!(index = %name, "Ensured index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sql(filter: &Filter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM documents");
        push_where(&mut builder, "sales", filter);
        builder.sql().to_string()
    }

    #[test]
    fn test_filter_translation() {
        let filter = Filter::gte("date", "2024-01-01T00:00:00.000Z").and(Filter::eq("userName", "Jyoti"));
        let text = sql(&filter);
        assert!(text.contains("WHERE collection = $1"));
        assert!(text.contains("jsonb_typeof((body #> $2)) = 'string'"));
        assert!(text.contains(">= $4::jsonb"));
        assert!(text.contains(" AND ((body #> $5) = $6::jsonb)"));
    }

    #[test]
    fn test_store_fields_map_to_columns() {
        assert!(sql(&Filter::Id(RecordId::new())).contains("id = $2"));
        assert!(sql(&Filter::exists("createdAt")).contains("to_char(created_at"));
    }

    #[test]
    fn test_range_on_non_scalar_never_matches() {
        assert!(sql(&Filter::gt("a", json!([1]))).ends_with("AND FALSE"));
        assert!(sql(&Filter::is_in("a", vec![])).ends_with("AND FALSE"));
    }

    #[test]
    fn test_order_puts_missing_first() {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_order(&mut builder, &[SortField::desc("date")]);
        assert_eq!(
            builder.sql(),
            " ORDER BY (body #> $1) DESC NULLS LAST, created_at ASC, id ASC"
        );
    }

    fn hourly_report() -> Pipeline {
        Pipeline::new()
            .match_filter(Filter::gte("date", "2024-03-15T00:00:00.000Z"))
            .group(
                GroupKey::DateBucket { path: "date".into(), unit: DateUnit::HourOfDay },
                vec![("totalAmount".into(), Accumulator::Sum("amount".into()))],
            )
            .sort(vec![SortField::asc("_id")])
            .project(vec![("bucket".into(), "_id".into()), ("totalAmount".into(), "totalAmount".into())])
    }

    fn grouped_sql(plan: &GroupedQuery<'_>) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_grouped_query(&mut builder, "sales", plan);
        builder.sql().to_string()
    }

    #[test]
    fn test_report_pipeline_runs_as_one_grouped_query() {
        let pipeline = hourly_report();
        let plan = GroupedQuery::plan(&pipeline).unwrap();
        assert!(plan.rest.is_empty());

        let text = grouped_sql(&plan);
        assert!(text.starts_with("SELECT COALESCE((SELECT jsonb_object_agg(p.k, p.v) FROM (VALUES ($1::text, (doc #> $2))"));
        assert!(text.contains(
            "SUM(CASE WHEN jsonb_typeof((body #> $6)) = 'number' THEN ((body #> $7) #>> '{}')::numeric END)"
        ));
        assert!(text.contains(
            "to_jsonb(extract(hour FROM ((body #> $8) #>> '{}')::timestamptz AT TIME ZONE 'UTC')::int)"
        ));
        assert!(text.contains("FROM documents WHERE collection = $9 AND "));
        assert!(text.contains(") src GROUP BY k) grouped"));
        assert!(text.ends_with("ORDER BY (doc #> $13) ASC NULLS FIRST, first_seen ASC"));
    }

    #[test]
    fn test_min_over_single_group_skips_nulls() {
        let pipeline = Pipeline::new().group(GroupKey::Null, vec![("lowest".into(), Accumulator::Min("amount".into()))]);
        let plan = GroupedQuery::plan(&pipeline).unwrap();

        let text = grouped_sql(&plan);
        assert!(text.starts_with("SELECT doc AS doc"));
        assert!(text.contains("SELECT 'null'::jsonb AS k"));
        assert!(text.contains(
            "(array_agg(CASE WHEN jsonb_typeof((body #> $2)) <> 'null' THEN (body #> $3) END ORDER BY "
        ));
        assert!(text.contains(" ASC NULLS LAST))[1]"));
        assert!(text.ends_with("GROUP BY k) grouped ORDER BY first_seen ASC"));
    }

    #[test]
    fn test_trailing_stages_are_left_for_process() {
        let pipeline = hourly_report().limit(3);
        let plan = GroupedQuery::plan(&pipeline).unwrap();
        assert_eq!(plan.rest, &[Stage::Limit(3)]);

        let nested = Pipeline::new()
            .group(GroupKey::Field("userName".into()), vec![("n".into(), Accumulator::Count)])
            .project(vec![("stats.n".into(), "n".into())]);
        let plan = GroupedQuery::plan(&nested).unwrap();
        assert!(plan.project.is_none());
        assert_eq!(plan.rest.len(), 1);
        assert!(grouped_sql(&plan).contains("COALESCE((body #> $2), 'null'::jsonb) AS k"));
    }

    #[test]
    fn test_ungrouped_pipelines_are_not_planned() {
        assert!(GroupedQuery::plan(&Pipeline::new().match_filter(Filter::eq("a", 1))).is_none());
        let sorted_first = Pipeline::new()
            .sort(vec![SortField::asc("a")])
            .group(GroupKey::Null, vec![("n".into(), Accumulator::Count)]);
        assert!(GroupedQuery::plan(&sorted_first).is_none());
    }

    #[test]
    fn test_index_names_reject_unsafe_input() {
        assert_eq!(index_name("sales", "date").unwrap(), "documents_sales_date_idx");
        assert!(index_name("sales", "date'; DROP").is_err());
        assert!(index_name("sa-les", "date").is_err());
    }
}
