//! Sales Records - API Server Binary
//!
//! This binary starts the HTTP API server for the sales records service.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin sales-api
//!
//! # Run against the in-memory store
//! API_STORAGE=memory API_PORT=8000 cargo run --bin sales-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8000)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_STORAGE` - `postgres` or `memory` (default: postgres)
//! * `API_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `API_SEED_COUNT` - Sales created by the seeding endpoint (default: 10001)
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use domain_sales::SalesRepository;
use infra_db::{create_pool, DocumentStore, InMemoryDocumentStore, PostgresDocumentStore};
use interface_api::config::{ApiConfig, StorageKind};
use interface_api::create_router;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Main entry point for the API server.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - Database connection or migrations fail
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = ?config.storage,
        "Starting sales API server"
    );

    let store = open_store(&config).await?;

    SalesRepository::new(Arc::clone(&store)).ensure_indexes().await?;

    let app = create_router(store, config.clone());

    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Connects the configured document store, applying migrations for PostgreSQL
async fn open_store(config: &ApiConfig) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    match config.storage {
        StorageKind::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        StorageKind::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(config.database_config()).await?;
            let store = PostgresDocumentStore::new(pool);
            store.ensure_schema().await?;
            tracing::info!("Database ready");
            Ok(Arc::new(store))
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits. If a signal
/// handler cannot be installed, the server keeps running until the other
/// signal arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
