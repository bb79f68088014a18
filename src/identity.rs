//! Authenticated identity attached to a request.

use serde::Serialize;

/// Identity established by the gate for one request.
///
/// Inserted into the request extensions only after successful validation
/// and only for that request. Downstream handlers read it with
/// `axum::Extension<AuthenticatedIdentity>`:
///
/// ```rust,ignore
/// async fn whoami(Extension(id): Extension<AuthenticatedIdentity>) -> String {
///     format!("{}@{}", id.principal, id.realm)
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedIdentity {
    /// Client principal name, e.g. `alice` or `host/client.example.com`.
    pub principal: String,
    /// Client realm, e.g. `EXAMPLE.COM`.
    pub realm: String,
    /// Always `true` for identities produced by the gate.
    pub authenticated: bool,
}

impl AuthenticatedIdentity {
    pub(crate) fn new(principal: String, realm: String) -> Self {
        Self {
            principal,
            realm,
            authenticated: true,
        }
    }

    /// `principal@REALM`
    pub fn qualified_name(&self) -> String {
        format!("{}@{}", self.principal, self.realm)
    }
}
