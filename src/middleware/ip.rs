//! Client address extraction for rejection diagnostics.
//!
//! The address is only ever logged. It plays no part in the authentication
//! decision, so header spoofing can at worst mislabel a log line.
//!
//! # Source Priority
//!
//! ```text
//! ConnectInfo<SocketAddr>  (peer of the TCP connection, when the server
//!        │                  was started with into_make_service_with_connect_info)
//!        ▼
//! X-Forwarded-For          (first hop)
//!        │
//!        ▼
//! X-Real-IP
//!        │
//!        ▼
//! "unknown"
//! ```

use std::borrow::Cow;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;

/// Fallback value when no client address can be determined.
pub const UNKNOWN_ADDR: &str = "unknown";

/// Best-effort client address for log lines.
///
/// Returns `Cow::Borrowed` for the `"unknown"` fallback so the common
/// no-information case does not allocate.
#[inline]
pub fn client_addr<B>(req: &Request<B>) -> Cow<'static, str> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Cow::Owned(addr.to_string());
    }

    // Format: "client, proxy1, proxy2" - we want the first (client) address
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && !first.trim().is_empty()
    {
        return Cow::Owned(first.trim().to_string());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return Cow::Owned(value.trim().to_string());
    }

    Cow::Borrowed(UNKNOWN_ADDR)
}
