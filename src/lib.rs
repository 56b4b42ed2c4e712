//! Sales Forecast API Library
//!
//! HTTP service that turns a store/item sales history into a multi-day
//! forecast using a pretrained Temporal Fusion Transformer.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod forecast;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::forecast::ModelBundle;
use crate::services::ForecastService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub bundle: Arc<ModelBundle>,
    pub forecast: ForecastService,
}

impl AppState {
    pub fn new(config: config::AppConfig, bundle: Arc<ModelBundle>) -> Self {
        let forecast = ForecastService::new(bundle.clone(), config.validation_policy());
        Self {
            config,
            bundle,
            forecast,
        }
    }
}

/// Forecast endpoint routes
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/forecast", post(handlers::forecast::create_forecast))
}

/// Builds the full application router: forecast API, health, metrics and docs.
///
/// CORS is left to the binary since its policy depends on the deployment.
pub fn build_router(state: AppState) -> Router {
    let max_body_size = state.config.max_body_size;
    let bundle = state.bundle.clone();

    Router::new()
        .nest("/api", api_routes())
        .nest("/health", health::health_routes(bundle))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/metrics/json", get(metrics::metrics_json_handler))
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(max_body_size))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::errors::{ErrorResponse, ServiceError};
    pub use crate::forecast::{
        ForecastModel, ForecastRequest, ForecastResponse, ModelBundle, ModelSchema, Observation,
    };
    pub use crate::services::ForecastService;
    pub use crate::{build_router, AppState};
}
