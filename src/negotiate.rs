//! `Negotiate` HTTP authentication scheme helpers.
//!
//! Parses `Authorization: Negotiate <base64>` credentials and holds the fixed
//! SPNEGO response tokens the gate sends back. The response tokens never
//! change, so they are kept pre-encoded rather than marshalled per request.

use axum::http::HeaderValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::AuthError;

/// Authentication scheme name.
pub const NEGOTIATE_SCHEME: &str = "Negotiate";

/// `WWW-Authenticate` value for the initial challenge.
pub const CHALLENGE_HEADER: &str = "Negotiate";

/// NegTokenResp `{negState: accept-completed, supportedMech: krb5}`.
pub const NEG_TOKEN_ACCEPT_COMPLETED: &str = "oRQwEqADCgEAoQsGCSqGSIb3EgECAg==";

/// NegTokenResp `{negState: reject}`.
pub const NEG_TOKEN_REJECT: &str = "oQcwBaADCgEC";

/// `WWW-Authenticate` value sent with a successfully authenticated response.
pub const ACCEPT_COMPLETED_HEADER: &str = "Negotiate oRQwEqADCgEAoQsGCSqGSIb3EgECAg==";

/// `WWW-Authenticate` value sent with every rejection.
pub const REJECT_HEADER: &str = "Negotiate oQcwBaADCgEC";

/// Body of every 401 response.
pub const UNAUTHORISED_BODY: &str = "Unauthorised.\n";

/// Maximum accepted length of the base64 token (64 KiB).
///
/// Kerberos tickets carrying large PACs run to a few tens of kilobytes;
/// anything bigger is refused before decoding.
pub const MAX_TOKEN_LENGTH: usize = 64 * 1024;

/// Extract the token from an `Authorization` header value.
///
/// The header is split on the first space; the scheme must be exactly
/// `Negotiate`. Returns `None` when no Negotiate credential is present, which
/// calls for a challenge rather than a rejection. The token itself is not
/// validated here and may be empty.
pub fn parse_negotiate_header(value: Option<&HeaderValue>) -> Option<&str> {
    let value = value?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    (scheme == NEGOTIATE_SCHEME).then_some(token)
}

/// Decode the base64 negotiation token.
///
/// # Errors
///
/// Returns a `MalformedToken` error for oversized or non-base64 input.
pub fn decode_token(token: &str) -> Result<Vec<u8>, AuthError> {
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(AuthError::malformed(format!(
            "negotiation token exceeds {MAX_TOKEN_LENGTH} bytes"
        )));
    }

    STANDARD.decode(token).map_err(|e| {
        AuthError::malformed(format!(
            "SPNEGO error in base64 decoding negotiation header: {e}"
        ))
    })
}
