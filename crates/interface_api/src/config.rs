//! API configuration

use std::time::Duration;

use serde::Deserialize;

use domain_sales::DEFAULT_SEED_COUNT;
use infra_db::DatabaseConfig;

/// Where documents are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Postgres,
    /// Process-local; data is lost on restart
    Memory,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL, used when `storage` is `postgres`
    pub database_url: String,
    /// Storage backend
    pub storage: StorageKind,
    /// Log level
    pub log_level: String,
    /// Maximum pool connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Number of sales created by the seeding endpoint
    pub seed_count: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: "postgres://localhost/sales".to_string(),
            storage: StorageKind::Postgres,
            log_level: "info".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            seed_count: DEFAULT_SEED_COUNT,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_*` environment variables, falling back
    /// to the defaults for anything unset
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("database_url", defaults.database_url)?
            .set_default("storage", "postgres")?
            .set_default("log_level", defaults.log_level)?
            .set_default("max_connections", i64::from(defaults.max_connections))?
            .set_default("min_connections", i64::from(defaults.min_connections))?
            .set_default("connect_timeout_secs", defaults.connect_timeout_secs as i64)?
            .set_default("idle_timeout_secs", defaults.idle_timeout_secs as i64)?
            .set_default("max_lifetime_secs", defaults.max_lifetime_secs as i64)?
            .set_default("seed_count", defaults.seed_count as i64)?
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pool settings for the PostgreSQL store
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.server_addr(), "0.0.0.0:8000");
        assert_eq!(config.storage, StorageKind::Postgres);
        assert_eq!(config.seed_count, 10_001);
        assert_eq!(config.database_config(), DatabaseConfig::new("postgres://localhost/sales"));
    }

    #[test]
    fn test_pool_settings_reach_database_config() {
        let config = ApiConfig {
            max_connections: 25,
            min_connections: 5,
            connect_timeout_secs: 3,
            idle_timeout_secs: 60,
            max_lifetime_secs: 900,
            ..ApiConfig::default()
        };

        let pool = config.database_config();
        assert_eq!(pool.max_connections, 25);
        assert_eq!(pool.min_connections, 5);
        assert_eq!(pool.connect_timeout, Duration::from_secs(3));
        assert_eq!(pool.idle_timeout, Duration::from_secs(60));
        assert_eq!(pool.max_lifetime, Duration::from_secs(900));
    }

    #[test]
    fn test_storage_kind_parses_lowercase() {
        let kind: StorageKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, StorageKind::Memory);
    }
}
