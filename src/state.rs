//! Shared gate state.
//!
//! Owns everything that lives for the whole process:
//!
//! - **Replay cache**: one instance shared by every request through the validator
//! - **Authentication gate**: the tower layer wrapping protected routes
//! - **Sweeper**: optional background task bounding cache memory between requests
//! - **Configuration**: runtime configuration access
//!
//! # Structured Concurrency
//!
//! The sweeper is managed with `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop it before exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::GateConfig;
use crate::krb5::{Keytab, TicketCrypto, TokenDecoder};
use crate::metrics;
use crate::middleware::AuthenticationGate;
use crate::replay::{ReplayCache, ReplaySweeper};
use crate::validator::TicketValidator;

/// Shared gate state.
///
/// Cheap to clone; all internal data is behind `Arc`.
///
/// # Lifecycle
///
/// Must be created inside a tokio runtime when a sweep interval is
/// configured, since the sweeper is spawned immediately:
///
/// ```rust,ignore
/// let state = GateState::new(config, decoder, crypto, keytab);
/// let app = build_router(&state, protected_routes);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct GateState {
    /// Gate configuration
    pub config: Arc<GateConfig>,
    /// Replay cache shared by every validation
    pub replay_cache: Arc<ReplayCache>,
    /// Authentication layer for protected routes
    pub gate: AuthenticationGate,
    /// Timestamp when the gate started
    pub started_at: Instant,
    sweeper: Option<Arc<ReplaySweeper>>,
}

impl GateState {
    /// Build the replay cache, validator and gate from configuration.
    ///
    /// Installs the Prometheus exporter when `METRICS_PORT` is set.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated gate configuration
    /// * `decoder` - SPNEGO/GSS-API token decoder
    /// * `crypto` - Ticket and authenticator decryption
    /// * `keytab` - Service keys
    pub fn new(
        config: GateConfig,
        decoder: Arc<dyn TokenDecoder>,
        crypto: Arc<dyn TicketCrypto>,
        keytab: Arc<Keytab>,
    ) -> Self {
        if let Some(addr) = config.metrics_addr() {
            metrics::try_init_metrics(addr);
        }

        let replay_cache = Arc::new(ReplayCache::with_capacity(
            config.max_clock_skew,
            config.replay_cache_max_entries,
        ));
        let validator = TicketValidator::new(replay_cache.clone());
        let gate = AuthenticationGate::from_config(&config, decoder, crypto, keytab, validator);

        let sweeper = config
            .replay_sweep_interval
            .map(|every| Arc::new(ReplaySweeper::spawn(replay_cache.clone(), every)));

        info!(
            max_clock_skew_secs = config.max_clock_skew.as_secs(),
            replay_cache_max_entries = config.replay_cache_max_entries,
            bypass_paths = ?config.bypass_paths,
            "SPNEGO gate initialized"
        );

        Self {
            config: Arc::new(config),
            replay_cache,
            gate,
            started_at: Instant::now(),
            sweeper,
        }
    }

    /// Stop background tasks.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.shutdown().await;
        }
    }

    /// Whether a background sweeper is running.
    pub fn has_sweeper(&self) -> bool {
        self.sweeper.is_some()
    }

    /// Get the gate uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
