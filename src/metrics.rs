//! Prometheus metrics for gate observability.
//!
//! Metrics are exposed via a dedicated HTTP listener when enabled with
//! `METRICS_PORT`. Without an installed exporter every recording function is
//! a no-op, so the gate can always call them.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `spnego_auth_requests_total` - Gate outcomes (labels: outcome, reason)
//!
//! ## Histograms
//! - `spnego_validation_duration_seconds` - Decode + decrypt + validation time
//!
//! ## Gauges
//! - `spnego_replay_cache_entries` - Live fingerprints held by the replay cache
//!
//! # Usage
//!
//! ```rust,ignore
//! use spnego_gate::metrics::{init_metrics, record_outcome};
//!
//! // Initialize metrics (call once at startup)
//! init_metrics("0.0.0.0:9090".parse()?)?;
//!
//! record_outcome("rejected", "replay");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::error::{GateError, GateResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_REQUESTS_TOTAL: &str = "spnego_auth_requests_total";
    pub const VALIDATION_DURATION_SECONDS: &str = "spnego_validation_duration_seconds";
    pub const REPLAY_CACHE_ENTRIES: &str = "spnego_replay_cache_entries";
}

/// Outcome label values.
pub mod outcomes {
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
    pub const CHALLENGED: &str = "challenged";
    pub const BYPASSED: &str = "bypassed";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns `GateError::MetricsError` if the exporter cannot be installed
/// (for example, the port is taken or a recorder is already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> GateResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| GateError::MetricsError(format!("Failed to install Prometheus exporter: {e}")))?;

    describe_counter!(
        names::AUTH_REQUESTS_TOTAL,
        "Total number of requests seen by the SPNEGO gate, by outcome and reason"
    );
    describe_histogram!(
        names::VALIDATION_DURATION_SECONDS,
        "Time spent decoding, decrypting and validating a Negotiate credential"
    );
    describe_gauge!(
        names::REPLAY_CACHE_ENTRIES,
        "Number of authenticator fingerprints held by the replay cache"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one gate outcome.
pub fn record_outcome(outcome: &'static str, reason: &'static str) {
    counter!(names::AUTH_REQUESTS_TOTAL, "outcome" => outcome, "reason" => reason).increment(1);
}

/// Record how long a credential took to process.
pub fn record_validation_duration(duration_secs: f64) {
    histogram!(names::VALIDATION_DURATION_SECONDS).record(duration_secs);
}

/// Update the replay cache size gauge.
pub fn set_replay_cache_entries(entries: usize) {
    gauge!(names::REPLAY_CACHE_ENTRIES).set(entries as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed exporter must not panic.

    #[test]
    fn test_record_outcome() {
        record_outcome(outcomes::ACCEPTED, "none");
        record_outcome(outcomes::REJECTED, "replay");
    }

    #[test]
    fn test_record_validation_duration() {
        record_validation_duration(0.002);
    }

    #[test]
    fn test_set_replay_cache_entries() {
        set_replay_cache_entries(0);
        set_replay_cache_entries(42);
    }
}
