use std::fmt;

use thiserror::Error;

/// Why a request failed authentication.
///
/// Every member converges on the same client-visible reject artifact. The
/// reason is only ever used for server-side logs and metrics so that the
/// validation pipeline cannot be probed as an oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// No `Authorization: Negotiate` credential was presented.
    MissingCredential,
    /// The negotiation token could not be decoded.
    MalformedToken,
    /// The negotiation does not carry a Kerberos 5 AP-REQ.
    UnsupportedMechanism,
    /// The ticket or authenticator could not be decrypted.
    DecryptionFailure,
    /// Authenticator client principal differs from the one in the ticket.
    BadMatch,
    /// Authenticator timestamp is outside the clock-skew tolerance.
    ClockSkew,
    /// The authenticator was already presented inside the replay window.
    Replay,
    /// The ticket start time is in the future, or the ticket is flagged invalid.
    NotYetValid,
    /// The ticket end time has passed.
    Expired,
    /// The replay cache is at capacity and cannot admit a new fingerprint.
    ReplayCacheFull,
}

impl RejectReason {
    /// Stable snake_case identifier used in log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingCredential => "missing_credential",
            RejectReason::MalformedToken => "malformed_token",
            RejectReason::UnsupportedMechanism => "unsupported_mechanism",
            RejectReason::DecryptionFailure => "decryption_failure",
            RejectReason::BadMatch => "bad_match",
            RejectReason::ClockSkew => "clock_skew",
            RejectReason::Replay => "replay",
            RejectReason::NotYetValid => "not_yet_valid",
            RejectReason::Expired => "expired",
            RejectReason::ReplayCacheFull => "replay_cache_full",
        }
    }

    /// The RFC 4120 `KRB_AP_ERR_*` code that best describes this reason.
    ///
    /// Only used for diagnostics; the code is never sent to the client.
    pub fn krb_error_code(&self) -> i32 {
        match self {
            RejectReason::MissingCredential => 0,
            RejectReason::MalformedToken => 41,
            RejectReason::UnsupportedMechanism => 39,
            RejectReason::DecryptionFailure => 31,
            RejectReason::BadMatch => 36,
            RejectReason::ClockSkew => 37,
            RejectReason::Replay => 34,
            RejectReason::NotYetValid => 33,
            RejectReason::Expired => 32,
            RejectReason::ReplayCacheFull => 34,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal, request-scoped authentication failure.
///
/// None of these are retried internally and none are fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct AuthError {
    pub reason: RejectReason,
    pub message: String,
}

impl AuthError {
    pub fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RejectReason::MalformedToken, message)
    }

    pub fn unsupported_mechanism(message: impl Into<String>) -> Self {
        Self::new(RejectReason::UnsupportedMechanism, message)
    }

    pub fn decryption(message: impl Into<String>) -> Self {
        Self::new(RejectReason::DecryptionFailure, message)
    }
}

/// Service-level errors raised while wiring the gate up.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics exporter error: {0}")]
    MetricsError(String),
}

/// Convenience type alias for Results with GateError.
pub type GateResult<T> = Result<T, GateError>;
