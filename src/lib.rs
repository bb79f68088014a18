//! # SPNEGO Gate
//!
//! HTTP authentication gate for Kerberos service tickets delivered through
//! SPNEGO (`Authorization: Negotiate <base64>`), built as an Axum/tower layer:
//!
//! - **Challenge**: requests without a Negotiate credential get `401` + `WWW-Authenticate: Negotiate`
//! - **Validation**: principal match, clock skew, replay detection, ticket validity window
//! - **Replay Cache**: process-wide, bounded, atomic check-and-record
//! - **Identity Propagation**: `AuthenticatedIdentity` in the request extensions
//! - **Observability**: structured rejection logs, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Trace → AuthenticationGate)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TokenDecoder / TicketCrypto  (SPNEGO + Kerberos codecs)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TicketValidator ──► ReplayCache (shared, Mutex-guarded)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (read AuthenticatedIdentity)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ASN.1 decoding and Kerberos encryption are supplied by the embedding
//! application through the [`TokenDecoder`] and [`TicketCrypto`] traits.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spnego_gate::{GateConfig, GateState, build_router};
//!
//! let config = GateConfig::from_env()?;
//! let state = GateState::new(config, decoder, crypto, keytab);
//! let app = build_router(&state, Router::new().route("/api", get(api)));
//!
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! state.shutdown().await;
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! SPNEGO_MAX_CLOCK_SKEW_SECS=300 SPNEGO_BYPASS_PATHS=/health,/ready METRICS_PORT=9090
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod krb5;
pub mod metrics;
pub mod middleware;
pub mod negotiate;
pub mod replay;
pub mod routes;
pub mod state;
pub mod validator;

// Re-exports for convenience
pub use config::GateConfig;
pub use error::{AuthError, GateError, GateResult, RejectReason};
pub use identity::AuthenticatedIdentity;
pub use krb5::{Keytab, TicketCrypto, TokenDecoder};
pub use middleware::{AuthenticationGate, GateOutcome};
pub use replay::{ReplayCache, ReplayCheck, ReplaySweeper};
pub use routes::{build_router, protect};
pub use state::GateState;
pub use validator::{AuthDecision, TicketValidator, ValidationContext};
