//! Generic repository engine
//!
//! [`Repository<T>`] provides paginated reads, creates, partial updates and
//! deletes for any [`Model`] over a [`DocumentStore`]. Domain repositories
//! wrap one and add their own queries through [`Repository::store`].

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};
use validator::Validate;

use core_kernel::RecordId;

use crate::document::{get_path, is_reserved_path, is_valid_path, set_path, Body, Document, Record};
use crate::error::RepositoryError;
use crate::filter::{validate_sort, Filter, Projection, SortField};
use crate::flatten::{apply_paths, flatten, unflatten};
use crate::pagination::{PageResult, PageWindow};
use crate::store::{DeleteResult, DocumentStore, FindQuery};

/// Page size used by `find_by_id`
const FIND_BY_ID_PAGE_SIZE: u64 = 10;

/// A record type stored in a named collection
pub trait Model: Serialize + DeserializeOwned + Validate + Send + Sync + 'static {
    /// Collection the records live in
    const COLLECTION: &'static str;
}

/// Replaces a reference field with the referenced document(s)
///
/// The field may hold one identifier or an array of them. A missing single
/// reference becomes `null`; missing entries are dropped from arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct Populate {
    pub path: String,
    pub collection: String,
    pub select: Option<Projection>,
}

impl Populate {
    pub fn new(path: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            collection: collection.into(),
            select: None,
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }
}

/// Read options for `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub populate: Vec<Populate>,
    pub select: Option<Projection>,
    /// Empty means insertion order
    pub sort: Vec<SortField>,
}

impl FindOptions {
    pub fn sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }

    pub fn populate(mut self, populate: Populate) -> Self {
        self.populate.push(populate);
        self
    }

    fn validate(&self) -> Result<(), RepositoryError> {
        validate_sort(&self.sort)?;
        if let Some(select) = &self.select {
            select.validate()?;
        }
        for populate in &self.populate {
            if !is_valid_path(&populate.path) || is_reserved_path(&populate.path) {
                return Err(RepositoryError::invalid_argument(format!(
                    "cannot populate '{}'",
                    populate.path
                )));
            }
            if let Some(select) = &populate.select {
                select.validate()?;
            }
        }
        Ok(())
    }
}

/// Options for create, update and delete
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Check the resulting record against the model's rules before writing
    pub validate: bool,
    /// Free-form note recorded on the operation's tracing span
    pub comment: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            validate: true,
            comment: None,
        }
    }
}

impl WriteOptions {
    pub fn without_validation() -> Self {
        Self {
            validate: false,
            ..Self::default()
        }
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// CRUD engine for one model
///
/// Stateless apart from the store handle; clones are cheap and share the
/// store.
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _model: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _model: PhantomData,
        }
    }
}

impl<T: Model> fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &T::COLLECTION)
            .field("store", &self.store)
            .finish()
    }
}

impl<T: Model> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _model: PhantomData,
        }
    }

    /// The underlying store, for queries the engine does not cover
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn collection(&self) -> &'static str {
        T::COLLECTION
    }

    /// Returns one page of typed records matching `filter`
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when `page` or `per_page` is zero or the filter
    ///   is malformed; the store is not called
    /// - any store failure, unchanged
    pub async fn find(
        &self,
        filter: Filter,
        page: u64,
        per_page: u64,
        options: &FindOptions,
    ) -> Result<PageResult<Record<T>>, RepositoryError> {
        self.find_documents(filter, page, per_page, options)
            .await?
            .try_map(|document| document.decode::<T>().map_err(RepositoryError::from))
    }

    /// Returns one page of untyped documents matching `filter`
    ///
    /// Use this instead of [`find`](Self::find) when a projection leaves
    /// out fields the model requires.
    #[instrument(skip(self, filter, options), fields(collection = T::COLLECTION))]
    pub async fn find_documents(
        &self,
        filter: Filter,
        page: u64,
        per_page: u64,
        options: &FindOptions,
    ) -> Result<PageResult<Document>, RepositoryError> {
        let window = PageWindow::new(page, per_page)?;
        filter.validate()?;
        options.validate()?;

        let total_count = self.store.count(T::COLLECTION, &filter).await?;

        let query = FindQuery::new(filter)
            .skip(window.skip)
            .limit(window.limit)
            .sort(options.sort.clone())
            .projection(options.select.clone());
        let mut fetched = self.store.fetch(T::COLLECTION, &query).await?;
        self.resolve_populate(&mut fetched, &options.populate).await?;

        let result = window.into_page(fetched, total_count);
        debug!(
            total_count,
            returned = result.data.len(),
            has_next = result.pagination.has_next,
            has_previous = result.pagination.has_previous,
            "Found page"
        );
        Ok(result)
    }

    /// Returns the record with identifier `id`
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty or unparsable identifier
    /// - `NotFound` when no record has it
    pub async fn find_by_id(&self, id: &str, populate: &[Populate]) -> Result<Record<T>, RepositoryError> {
        self.find_document_by_id(id, populate)
            .await?
            .decode()
            .map_err(RepositoryError::from)
    }

    /// Untyped form of [`find_by_id`](Self::find_by_id)
    pub async fn find_document_by_id(
        &self,
        id: &str,
        populate: &[Populate],
    ) -> Result<Document, RepositoryError> {
        let record_id = RecordId::parse(id)?;
        let options = FindOptions {
            populate: populate.to_vec(),
            ..FindOptions::default()
        };

        self.find_documents(Filter::Id(record_id), 1, FIND_BY_ID_PAGE_SIZE, &options)
            .await?
            .data
            .into_iter()
            .next()
            .ok_or_else(|| {
                RepositoryError::not_found(format!("{} record '{}' not found", T::COLLECTION, id))
            })
    }

    /// Creates a record from a possibly nested payload
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when the payload is not a JSON object or writes
    ///   a store-owned field
    /// - `ValidationFailed` when the record breaks the model's rules
    #[instrument(skip(self, payload, options), fields(collection = T::COLLECTION, comment = ?options.comment))]
    pub async fn create<P>(&self, payload: &P, options: &WriteOptions) -> Result<Record<T>, RepositoryError>
    where
        P: Serialize + ?Sized,
    {
        let paths = payload_paths(payload)?;
        let body = unflatten(&paths)?;
        if options.validate {
            validate_body::<T>(&body)?;
        }

        let document = self.store.insert(T::COLLECTION, body).await?;
        info!(id = %document.id, "Created record");
        Ok(document.decode()?)
    }

    /// Applies a partial update; paths absent from `payload` are untouched
    ///
    /// `existing` skips the initial load when the caller already holds the
    /// current document. Concurrent updates to the same path are
    /// last-write-wins; there is no version check.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a bad identifier or a non-object payload
    /// - `NotFound` when the record does not exist
    /// - `ValidationFailed` when the merged record breaks the model's rules
    #[instrument(skip(self, payload, existing, options), fields(collection = T::COLLECTION, comment = ?options.comment))]
    pub async fn update<P>(
        &self,
        id: &str,
        payload: &P,
        existing: Option<Document>,
        options: &WriteOptions,
    ) -> Result<Record<T>, RepositoryError>
    where
        P: Serialize + ?Sized,
    {
        let document = match existing {
            Some(document) => document,
            None => self.find_document_by_id(id, &[]).await?,
        };

        let paths = payload_paths(payload)?;
        if paths.is_empty() {
            debug!("Empty update payload");
            return Ok(document.decode()?);
        }

        let mut merged = document.body.clone();
        apply_paths(&mut merged, &paths)?;
        if options.validate {
            validate_body::<T>(&merged)?;
        }

        let updated = self
            .store
            .set_fields(T::COLLECTION, document.id, &paths)
            .await?;
        info!(id = %updated.id, paths = paths.len(), "Updated record");
        Ok(updated.decode()?)
    }

    /// Removes a record and returns its last state
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a bad identifier
    /// - `NotFound` when the record does not exist
    #[instrument(skip(self, existing, options), fields(collection = T::COLLECTION, comment = ?options.comment))]
    pub async fn delete(
        &self,
        id: &str,
        existing: Option<Document>,
        options: &WriteOptions,
    ) -> Result<Record<T>, RepositoryError> {
        let document = match existing {
            Some(document) => document,
            None => self.find_document_by_id(id, &[]).await?,
        };

        let removed = self
            .store
            .remove(T::COLLECTION, document.id)
            .await?
            .ok_or_else(|| {
                RepositoryError::not_found(format!("{} record '{}' not found", T::COLLECTION, id))
            })?;
        info!(id = %removed.id, "Deleted record");
        Ok(removed.decode()?)
    }

    /// Removes every record matching `filter` in one store call
    ///
    /// Nothing is checked beforehand: `Filter::All` empties the collection.
    #[instrument(skip(self, filter), fields(collection = T::COLLECTION))]
    pub async fn delete_by_cond(&self, filter: Filter) -> Result<DeleteResult, RepositoryError> {
        filter.validate()?;
        let deleted_count = self.store.remove_many(T::COLLECTION, &filter).await?;
        info!(deleted_count, "Deleted records by condition");
        Ok(DeleteResult { deleted_count })
    }

    async fn resolve_populate(
        &self,
        documents: &mut [Document],
        populates: &[Populate],
    ) -> Result<(), RepositoryError> {
        for populate in populates {
            let mut wanted: Vec<RecordId> = documents
                .iter()
                .filter_map(|doc| get_path(&doc.body, &populate.path))
                .flat_map(referenced_ids)
                .collect();
            if wanted.is_empty() {
                continue;
            }
            wanted.sort();
            wanted.dedup();

            let query = FindQuery::new(Filter::IdIn(wanted)).projection(populate.select.clone());
            let found: HashMap<RecordId, Value> = self
                .store
                .fetch(&populate.collection, &query)
                .await?
                .into_iter()
                .map(|doc| (doc.id, doc.to_value()))
                .collect();

            for document in documents.iter_mut() {
                let replacement = match get_path(&document.body, &populate.path) {
                    Some(Value::String(raw)) => RecordId::parse(raw)
                        .ok()
                        .map(|id| found.get(&id).cloned().unwrap_or(Value::Null)),
                    Some(Value::Array(items)) => Some(Value::Array(
                        items
                            .iter()
                            .filter_map(|item| item.as_str())
                            .filter_map(|raw| RecordId::parse(raw).ok())
                            .filter_map(|id| found.get(&id).cloned())
                            .collect(),
                    )),
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    set_path(&mut document.body, &populate.path, replacement)?;
                }
            }
        }
        Ok(())
    }
}

fn referenced_ids(value: &Value) -> Vec<RecordId> {
    match value {
        Value::String(raw) => RecordId::parse(raw).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|raw| RecordId::parse(raw).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// Serializes a payload and flattens it into dotted paths
fn payload_paths<P: Serialize + ?Sized>(payload: &P) -> Result<Body, RepositoryError> {
    let value = serde_json::to_value(payload).map_err(|e| {
        RepositoryError::invalid_argument(format!("payload could not be serialized: {}", e))
    })?;
    let Value::Object(object) = value else {
        return Err(RepositoryError::invalid_argument("payload must be a JSON object"));
    };

    let paths = flatten(&object);
    if let Some(path) = paths.keys().find(|path| !is_valid_path(path)) {
        return Err(RepositoryError::invalid_argument(format!(
            "malformed field path '{}' in payload",
            path
        )));
    }
    if let Some(path) = paths.keys().find(|path| is_reserved_path(path)) {
        return Err(RepositoryError::invalid_argument(format!(
            "field '{}' is assigned by the store",
            path
        )));
    }
    Ok(paths)
}

/// Checks that a body decodes into the model and passes its rules
fn validate_body<T: Model>(body: &Body) -> Result<(), RepositoryError> {
    let record: T = serde_json::from_value(Value::Object(body.clone()))
        .map_err(|e| RepositoryError::validation(e.to_string()))?;
    record
        .validate()
        .map_err(|e| RepositoryError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
    struct Note {
        #[validate(length(min = 1))]
        title: String,
    }

    impl Model for Note {
        const COLLECTION: &'static str = "notes";
    }

    #[test]
    fn test_payload_paths_rejects_non_objects() {
        assert!(payload_paths(&json!([1, 2])).unwrap_err().is_invalid_argument());
        assert!(payload_paths(&json!("text")).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_payload_paths_rejects_store_fields() {
        let err = payload_paths(&json!({ "_id": "x" })).unwrap_err();
        assert!(err.is_invalid_argument());
        let err = payload_paths(&json!({ "createdAt": { "nested": 1 } })).unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_validate_body() {
        let ok = json!({ "title": "hello" }).as_object().cloned().unwrap();
        assert!(validate_body::<Note>(&ok).is_ok());

        let empty = json!({ "title": "" }).as_object().cloned().unwrap();
        assert!(validate_body::<Note>(&empty).unwrap_err().is_validation_failed());

        let wrong_type = json!({ "title": 5 }).as_object().cloned().unwrap();
        assert!(validate_body::<Note>(&wrong_type).unwrap_err().is_validation_failed());
    }

    #[test]
    fn test_write_options_default_validates() {
        assert!(WriteOptions::default().validate);
        assert!(!WriteOptions::without_validation().validate);
        assert_eq!(
            WriteOptions::default().comment("seed").comment.as_deref(),
            Some("seed")
        );
    }

    #[test]
    fn test_find_options_reject_reserved_populate() {
        let options = FindOptions::default().populate(Populate::new("_id", "notes"));
        assert!(options.validate().unwrap_err().is_invalid_argument());
    }
}
