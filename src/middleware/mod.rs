//! HTTP middleware for SPNEGO authentication.
//!
//! - **Authentication Gate**: Negotiate challenge, AP-REQ validation, identity propagation
//! - **Client Address**: Best-effort peer address for rejection logs
//!
//! # Architecture
//!
//! ```text
//! Request → Trace → AuthenticationGate → Handler → Response
//!                        ↓          ↓
//!                  401 challenge   401 reject
//! ```

pub mod auth;
pub mod ip;

pub use auth::{AuthenticationGate, AuthenticationGateService, GateOutcome};
pub use ip::{UNKNOWN_ADDR, client_addr};
