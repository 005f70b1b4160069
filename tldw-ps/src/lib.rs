//! tldw-ps library interface
//!
//! Exposes the pipeline core and the HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use crate::config::ServiceConfig;
use crate::services::{AdmissionQueue, PipelineFactory};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    /// Process-wide admission gate
    pub queue: Arc<AdmissionQueue>,
    /// Chooses stage collaborators per job
    pub factory: Arc<dyn PipelineFactory>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServiceConfig, factory: Arc<dyn PipelineFactory>) -> Self {
        let queue = Arc::new(AdmissionQueue::new(
            config.max_concurrent_jobs,
            config.request_timeout,
        ));

        Self {
            config: Arc::new(config),
            queue,
            factory,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// `/api/*` routes share one admission queue through the lifecycle layer.
pub fn build_router(state: AppState) -> Router {
    let lifecycle = api::RequestLifecycleLayer::new(
        Arc::clone(&state.queue),
        state.config.request_timeout,
    );

    Router::new()
        .merge(api::summarize_routes(state.config.max_upload_bytes).layer(lifecycle))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
