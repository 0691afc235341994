//! Ports and Adapters Infrastructure
//!
//! Storage adapters (PostgreSQL, in-memory) sit behind port traits defined in
//! `infra_db`. This module carries the pieces every adapter shares: the
//! marker trait and the health-check contract used by the readiness check.
//!
//! ```text
//!   Repository<T> / SalesRepository
//!                 │
//!                 ▼
//!        DocumentStore (port)
//!          ▲            ▲
//!          │            │
//!   PostgreSQL      In-memory
//!    adapter         adapter
//! ```

use serde::{Deserialize, Serialize};

/// Marker trait for all ports
///
/// All port traits should extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    /// Adapter is healthy and operational
    Healthy,
    /// Adapter is degraded but operational
    Degraded,
    /// Adapter is unhealthy and not operational
    Unhealthy,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Adapter identifier
    pub adapter_id: String,
    /// Current health status
    pub status: AdapterHealth,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
    /// Optional message with additional details
    pub message: Option<String>,
    /// Timestamp of the health check
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn unhealthy(adapter_id: impl Into<String>, latency_ms: u64, message: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Unhealthy,
            latency_ms,
            message: Some(message.into()),
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Performs a health check on the adapter
    ///
    /// # Returns
    ///
    /// A `HealthCheckResult` indicating the current health status
    async fn health_check(&self) -> HealthCheckResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_result_constructors() {
        let ok = HealthCheckResult::healthy("memory", 0);
        assert!(ok.is_healthy());
        assert!(ok.message.is_none());

        let down = HealthCheckResult::unhealthy("postgres", 12, "connection refused");
        assert!(!down.is_healthy());
        assert_eq!(down.message.as_deref(), Some("connection refused"));
    }
}
