//! Router assembly with the authentication gate.
//!
//! # Middleware Stack
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging, rejections included
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  SPNEGO Gate     │ ← 401 challenge / reject (bypassed for /health)
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Health probe (auth bypassed by default)
//! - `/whoami` - Echo of the authenticated identity
//! - anything in the caller's `protected` router

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::AuthenticationGate;
use crate::state::GateState;

/// Build the application router: built-in routes merged with `protected`,
/// all behind the gate.
///
/// # Arguments
///
/// * `state` - Gate state holding the layer and replay cache
/// * `protected` - Application routes requiring Kerberos authentication
pub fn build_router(state: &GateState, protected: Router) -> Router {
    let builtin = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/whoami", get(handlers::whoami))
        .with_state(state.clone());

    protect(builtin.merge(protected), state.gate.clone())
}

/// Wrap any router with the gate and request tracing.
///
/// Layers added later run first, so tracing sees every request including
/// the ones the gate refuses.
pub fn protect(router: Router, gate: AuthenticationGate) -> Router {
    router.layer(gate).layer(TraceLayer::new_for_http())
}
