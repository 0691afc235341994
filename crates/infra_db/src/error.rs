//! Database error types
//!
//! Two layers of errors live here. `DatabaseError` is what a store adapter
//! reports; it keeps the backend's own classification (SQLSTATE codes for
//! PostgreSQL). `RepositoryError` is what the repository engine hands to its
//! callers: one distinct, inspectable kind per failure class, with the
//! backend error kept as the source where there is one.

use thiserror::Error;

use core_kernel::CoreError;

/// Errors that can occur during database operations
///
/// This enum captures all possible store-level errors, including
/// connection issues, query failures, and constraint violations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Check constraint violation, or a field path that cannot be written
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Transaction error
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Creates a not found error for a specific collection and identifier
    ///
    /// # Arguments
    ///
    /// * `collection` - The collection that was searched (e.g., "sales")
    /// * `id` - The identifier that was not found
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("sales", "REC-123");
    /// assert!(error.to_string().contains("sales"));
    /// ```
    pub fn not_found(collection: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("record with id '{}' not found in {}", id, collection))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
            || matches!(self, DatabaseError::SqlError(sqlx::Error::RowNotFound))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_) | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        match self {
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted => true,
            DatabaseError::SqlError(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            ),
            _ => false,
        }
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// This function analyzes the SQLx error and maps it to the appropriate
/// DatabaseError variant based on the PostgreSQL error code.
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => {
                DatabaseError::NotFound("Record not found".to_string())
            }
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => {
                // PostgreSQL error codes
                // https://www.postgresql.org/docs/current/errcodes-appendix.html
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                        "23502" | "23514" => {
                            DatabaseError::ConstraintViolation(db_err.message().to_string())
                        }
                        "40001" | "40P01" => {
                            DatabaseError::TransactionFailed(db_err.message().to_string())
                        }
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        DatabaseError::SerializationError(error.to_string())
    }
}

/// Errors surfaced by the repository engine
///
/// Every failure reaches the caller as one of these kinds; none is retried
/// or swallowed.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Bad page/perPage, empty or malformed identifier, malformed filter.
    /// Raised before any store call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No record for the requested identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record violates a field constraint
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The store could not be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] DatabaseError),

    /// Any other store failure, passed through unchanged
    #[error("Storage error: {0}")]
    Storage(#[source] DatabaseError),
}

impl RepositoryError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RepositoryError::InvalidArgument(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        RepositoryError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RepositoryError::ValidationFailed(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RepositoryError::InvalidArgument(_))
    }

    pub fn is_validation_failed(&self) -> bool {
        matches!(self, RepositoryError::ValidationFailed(_))
    }
}

impl From<DatabaseError> for RepositoryError {
    fn from(error: DatabaseError) -> Self {
        if error.is_not_found() {
            RepositoryError::NotFound(error.to_string())
        } else if error.is_constraint_violation() {
            RepositoryError::ValidationFailed(error.to_string())
        } else if error.is_connection_error() {
            RepositoryError::StorageUnavailable(error)
        } else {
            RepositoryError::Storage(error)
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error).into()
    }
}

impl From<CoreError> for RepositoryError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::NotFound(msg) => RepositoryError::NotFound(msg),
            CoreError::Validation(msg) => RepositoryError::ValidationFailed(msg),
            other => RepositoryError::InvalidArgument(other.to_string()),
        }
    }
}
