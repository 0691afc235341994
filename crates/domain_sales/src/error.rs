//! Sales domain errors

use thiserror::Error;

use core_kernel::TemporalError;
use infra_db::RepositoryError;

/// Errors raised by sales reports and seeding
#[derive(Debug, Error)]
pub enum SalesError {
    /// Unknown report kind
    #[error("Invalid statsType '{0}', expected one of: daily, monthly")]
    InvalidStatsType(String),

    /// The report window could not be computed
    #[error("Invalid report window: {0}")]
    Window(#[from] TemporalError),

    /// A report row did not have the expected shape
    #[error("Malformed report entry: {0}")]
    MalformedReport(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
