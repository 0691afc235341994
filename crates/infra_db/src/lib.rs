//! Infrastructure Database Layer
//!
//! Document storage for the sales records service and the generic
//! repository engine on top of it.
//!
//! # Architecture
//!
//! The crate follows the repository pattern. Domain crates define a
//! [`Model`] and wrap a [`Repository`]; the repository talks to storage only
//! through the [`DocumentStore`] port, which has a PostgreSQL adapter
//! (JSONB documents) and an in-memory adapter.
//!
//! # Pagination
//!
//! Pages are read with one count and one fetch. The fetch asks for up to two
//! extra "sentinel" records around the page; their presence decides
//! `has_previous`/`has_next` (see [`pagination`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresDocumentStore, Repository};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/sales")).await?;
//! let store = PostgresDocumentStore::new(pool);
//! store.ensure_schema().await?;
//! let sales: Repository<Sale> = Repository::new(Arc::new(store));
//! let page = sales.find(Filter::All, 1, 10, &FindOptions::default()).await?;
//! ```

pub mod pool;
pub mod error;
pub mod document;
pub mod filter;
pub mod flatten;
pub mod pagination;
pub mod aggregate;
pub mod store;
pub mod repository;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use error::{DatabaseError, RepositoryError};
pub use document::{Body, Document, Record};
pub use filter::{Filter, Projection, SortDirection, SortField};
pub use pagination::{PageResult, PageWindow, Pagination};
pub use aggregate::{Accumulator, DateUnit, GroupKey, Pipeline, Stage};
pub use store::{DeleteResult, DocumentStore, FindQuery, InMemoryDocumentStore, PostgresDocumentStore};
pub use repository::{FindOptions, Model, Populate, Repository, WriteOptions};
