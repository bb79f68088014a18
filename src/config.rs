//! Gate configuration loaded from environment variables.
//!
//! # Authentication
//!
//! - `SPNEGO_MAX_CLOCK_SKEW_SECS`: Clock-skew tolerance, also the replay window (default: 300)
//! - `SPNEGO_BYPASS_PATHS`: Comma-separated paths served without authentication (default: `/health`)
//! - `SPNEGO_LOG_REJECTIONS`: Emit a log line for every rejected credential (default: true)
//!
//! # Replay Cache
//!
//! - `SPNEGO_REPLAY_CACHE_MAX_ENTRIES`: Hard cap on remembered fingerprints (default: 100000)
//! - `SPNEGO_REPLAY_SWEEP_INTERVAL_SECS`: Background sweep period, 0 disables it (default: 60)
//!
//! # Observability
//!
//! - `METRICS_PORT`: Prometheus listener port, 0 disables it (default: 0)

use std::env;
use std::time::Duration;

use crate::error::{GateError, GateResult};
use crate::replay::DEFAULT_MAX_ENTRIES;

/// Default clock-skew tolerance (5 minutes).
pub const DEFAULT_MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Gate configuration.
///
/// # Example
///
/// ```rust,ignore
/// let config = GateConfig::from_env()?;
/// let cache = Arc::new(ReplayCache::with_capacity(config.max_clock_skew, config.replay_cache_max_entries));
/// ```
#[derive(Debug, Clone)]
pub struct GateConfig {
    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Maximum tolerated difference between client and server clocks.
    /// Also used as the replay-cache window.
    pub max_clock_skew: Duration,

    /// Paths forwarded without authentication (exact match).
    pub bypass_paths: Vec<String>,

    /// Whether rejections are logged. Disabling this never disables the rejection.
    pub log_rejections: bool,

    // =========================================================================
    // Replay Cache Configuration
    // =========================================================================
    /// Maximum fingerprints held at once; new ones are refused beyond this.
    pub replay_cache_max_entries: usize,

    /// Background sweep period (None = lazy sweeping only).
    pub replay_sweep_interval: Option<Duration>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (0 = disabled)
    pub metrics_port: u16,
}

impl GateConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ConfigError` if a value does not parse or fails validation.
    pub fn from_env() -> GateResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let sweep_secs: u64 = Self::parse_env("SPNEGO_REPLAY_SWEEP_INTERVAL_SECS", 60)?;

        let config = Self {
            max_clock_skew: Duration::from_secs(Self::parse_env(
                "SPNEGO_MAX_CLOCK_SKEW_SECS",
                DEFAULT_MAX_CLOCK_SKEW.as_secs(),
            )?),
            bypass_paths: Self::parse_bypass_paths(),
            log_rejections: Self::parse_env("SPNEGO_LOG_REJECTIONS", true)?,
            replay_cache_max_entries: Self::parse_env(
                "SPNEGO_REPLAY_CACHE_MAX_ENTRIES",
                DEFAULT_MAX_ENTRIES,
            )?,
            replay_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ConfigError` if validation fails.
    pub fn validate(&self) -> GateResult<()> {
        if self.max_clock_skew.is_zero() {
            return Err(GateError::ConfigError(
                "SPNEGO_MAX_CLOCK_SKEW_SECS must be greater than 0".to_string(),
            ));
        }

        if self.replay_cache_max_entries == 0 {
            return Err(GateError::ConfigError(
                "SPNEGO_REPLAY_CACHE_MAX_ENTRIES must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> GateResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| GateError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse bypass paths from environment variable.
    ///
    /// Only entries starting with `/` are kept.
    fn parse_bypass_paths() -> Vec<String> {
        env::var("SPNEGO_BYPASS_PATHS")
            .unwrap_or_else(|_| "/health".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s.starts_with('/'))
            .collect()
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_clock_skew: DEFAULT_MAX_CLOCK_SKEW,
            bypass_paths: vec!["/health".to_string()],
            log_rejections: true,
            replay_cache_max_entries: DEFAULT_MAX_ENTRIES,
            replay_sweep_interval: Some(Duration::from_secs(60)),
            metrics_port: 0,
        }
    }
}
