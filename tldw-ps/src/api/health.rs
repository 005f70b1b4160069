//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok", or "busy" when no job slot is free)
    pub status: String,
    /// Module name ("tldw-ps")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Requests currently admitted
    pub in_flight: usize,
    /// Admission limit
    pub max_concurrent_jobs: usize,
}

/// GET /health
///
/// Not admission-gated, so it answers even when every slot is taken.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let in_flight = state.queue.len();
    let limit = state.queue.limit();

    Json(HealthResponse {
        status: if in_flight >= limit { "busy" } else { "ok" }.to_string(),
        module: "tldw-ps".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        in_flight,
        max_concurrent_jobs: limit,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
