//! HTTP API Layer
//!
//! This crate provides the REST API for the sales records service using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for sales and health checks
//! - **Middleware**: Request logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(store, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    http::HeaderName,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_sales::SalesRepository;
use infra_db::DocumentStore;

use crate::config::ApiConfig;
use crate::handlers::{health, sales};
use crate::middleware::request_logging;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sales: SalesRepository,
    pub store: Arc<dyn DocumentStore>,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// # Arguments
///
/// * `store` - Document store backing every repository
/// * `config` - API configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(store: Arc<dyn DocumentStore>, config: ApiConfig) -> Router {
    let state = AppState {
        sales: SalesRepository::new(Arc::clone(&store)),
        store,
        config,
    };

    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let sales_routes = Router::new()
        .route("/", post(sales::create_sale).get(sales::list_sales))
        .route("/reports", get(sales::get_sales_report))
        .route("/generate_random_data", post(sales::generate_random_data))
        .route(
            "/:id",
            get(sales::get_sale).put(sales::update_sale).delete(sales::delete_sale),
        );

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .merge(health_routes)
        .nest("/sales", sales_routes)
        .layer(axum_middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
