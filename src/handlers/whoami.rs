//! Identity echo endpoint.

use axum::{Extension, Json};

use crate::identity::AuthenticatedIdentity;

/// `GET /whoami` - return the identity the gate attached to this request.
///
/// Only reachable through the gate; without an accepted credential the
/// request never gets here.
pub async fn whoami(
    Extension(identity): Extension<AuthenticatedIdentity>,
) -> Json<AuthenticatedIdentity> {
    Json(identity)
}
