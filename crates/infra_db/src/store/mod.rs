//! Document store port
//!
//! The repository engine talks to storage only through [`DocumentStore`].
//! Two adapters implement it:
//!
//! - [`PostgresDocumentStore`]: JSONB bodies in a single `documents` table
//! - [`InMemoryDocumentStore`]: process-local, used by tests and local runs
//!
//! Both evaluate filters, sorts and pipelines with the same semantics, see
//! [`crate::filter`] and [`crate::aggregate`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use core_kernel::{DomainPort, HealthCheckable, RecordId};

use crate::aggregate::Pipeline;
use crate::document::{Body, Document};
use crate::error::DatabaseError;
use crate::filter::{Filter, Projection, SortField};

pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;

/// A fetch request against one collection
///
/// Without a sort, documents come back in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub skip: u64,
    pub limit: Option<u64>,
    pub sort: Vec<SortField>,
    pub projection: Option<Projection>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }
}

/// Outcome of a bulk delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Storage port for JSON documents grouped into named collections
#[async_trait]
pub trait DocumentStore: DomainPort + HealthCheckable + std::fmt::Debug {
    /// Number of documents matching `filter`
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError>;

    /// Documents matching the query, sorted, skipped and limited
    async fn fetch(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, DatabaseError>;

    /// Stores a new document; the store assigns its id and timestamps
    async fn insert(&self, collection: &str, body: Body) -> Result<Document, DatabaseError>;

    /// Writes each dotted path in `fields` onto an existing document,
    /// leaving every other path untouched, and returns the updated document
    ///
    /// Fails with `NotFound` when no document has `id`.
    async fn set_fields(
        &self,
        collection: &str,
        id: RecordId,
        fields: &Body,
    ) -> Result<Document, DatabaseError>;

    /// Removes one document, returning it if it existed
    async fn remove(&self, collection: &str, id: RecordId) -> Result<Option<Document>, DatabaseError>;

    /// Removes every document matching `filter`, returning how many went
    async fn remove_many(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError>;

    /// Runs a read-only aggregation pipeline over the collection
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>, DatabaseError>;

    /// Declares a secondary index on a field path
    async fn ensure_index(&self, _collection: &str, _path: &str) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Renders documents the way filters and pipelines see them
pub(crate) fn render(document: &Document) -> Body {
    match document.to_value() {
        Value::Object(rendered) => rendered,
        _ => Body::new(),
    }
}
