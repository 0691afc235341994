//! In-memory document store
//!
//! Keeps every collection in a `Vec` in insertion order behind a
//! `tokio::sync::RwLock`. Every port call is counted, and the store can be
//! switched to fail every call as if the database were unreachable.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use core_kernel::temporal::now_millis;
use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, RecordId};

use super::{render, DocumentStore, FindQuery};
use crate::aggregate::Pipeline;
use crate::document::{Body, Document};
use crate::error::DatabaseError;
use crate::filter::{compare_by, Filter};
use crate::flatten::apply_paths;

const ADAPTER_ID: &str = "memory-document-store";

/// Process-local [`DocumentStore`]
///
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
    indexes: Arc<RwLock<BTreeSet<(String, String)>>>,
    calls: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of port calls made so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Makes every following call fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Indexes declared through `ensure_index`, as `(collection, path)`
    pub async fn indexes(&self) -> Vec<(String, String)> {
        self.indexes.read().await.iter().cloned().collect()
    }

    /// Number of documents stored in a collection
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    fn begin(&self) -> Result<(), DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionFailed(
                "in-memory store is marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl DomainPort for InMemoryDocumentStore {}

#[async_trait]
impl HealthCheckable for InMemoryDocumentStore {
    async fn health_check(&self) -> HealthCheckResult {
        if self.unavailable.load(Ordering::SeqCst) {
            HealthCheckResult::unhealthy(ADAPTER_ID, 0, "store marked unavailable")
        } else {
            HealthCheckResult::healthy(ADAPTER_ID, 0)
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    #[instrument(skip(self, filter))]
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError> {
        self.begin()?;
        let collections = self.collections.read().await;
        let count = collections
            .get(collection)
            .map_or(0, |docs| docs.iter().filter(|doc| filter.matches(doc)).count());
        Ok(count as u64)
    }

    #[instrument(skip(self, query), fields(skip = query.skip, limit = ?query.limit))]
    async fn fetch(&self, collection: &str, query: &FindQuery) -> Result<Vec<Document>, DatabaseError> {
        self.begin()?;
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<(Body, &Document)> = docs
            .iter()
            .map(|doc| (render(doc), doc))
            .filter(|(rendered, _)| query.filter.matches_body(rendered))
            .collect();
        if !query.sort.is_empty() {
            matched.sort_by(|(a, _), (b, _)| compare_by(&query.sort, a, b));
        }

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));

        let fetched: Vec<Document> = matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|(_, doc)| match &query.projection {
                Some(projection) => projection.apply(doc),
                None => Ok(doc.clone()),
            })
            .collect::<Result<_, _>>()?;
        debug!(fetched = fetched.len(), "Fetched documents");
        Ok(fetched)
    }

    #[instrument(skip(self, body))]
    async fn insert(&self, collection: &str, body: Body) -> Result<Document, DatabaseError> {
        self.begin()?;
        let document = Document::new(body, now_millis());
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
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
        self.begin()?;
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|doc| doc.id == id))
            .ok_or_else(|| DatabaseError::not_found(collection, id))?;

        let mut body = document.body.clone();
        apply_paths(&mut body, fields)?;
        document.body = body;
        document.updated_at = now_millis().max(document.created_at);
        Ok(document.clone())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn remove(&self, collection: &str, id: RecordId) -> Result<Option<Document>, DatabaseError> {
        self.begin()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|doc| doc.id == id)
            .map(|index| docs.remove(index)))
    }

    #[instrument(skip(self, filter))]
    async fn remove_many(&self, collection: &str, filter: &Filter) -> Result<u64, DatabaseError> {
        self.begin()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        let removed = (before - docs.len()) as u64;
        debug!(removed, "Removed documents");
        Ok(removed)
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.stages().len()))]
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>, DatabaseError> {
        self.begin()?;
        let rendered: Vec<Body> = self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| docs.iter().map(render).collect())
            .unwrap_or_default();
        pipeline.run(rendered)
    }

    #[instrument(skip(self))]
    async fn ensure_index(&self, collection: &str, path: &str) -> Result<(), DatabaseError> {
        self.begin()?;
        self.indexes
            .write()
            .await
            .insert((collection.to_string(), path.to_string()));
        Ok(())
    }
}
