//! Health endpoint.
//!
//! `GET /health` is on the default bypass list, so probes reach it without
//! a Kerberos ticket.

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::state::GateState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
    /// Live fingerprints in the replay cache
    pub replay_cache_entries: usize,
    /// Seconds since the gate was created
    pub uptime_seconds: u64,
}

/// Health check endpoint.
///
/// Always returns 200 OK.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "replay_cache_entries": 12,
///   "uptime_seconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<GateState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        replay_cache_entries: state.replay_cache.len(),
        uptime_seconds: state.uptime_seconds(),
    })
}
