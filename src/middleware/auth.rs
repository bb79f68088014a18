//! SPNEGO/Kerberos authentication gate.
//!
//! # Request Flow
//!
//! ```text
//! Authorization header
//!   │ missing / not "Negotiate <token>" ─────────────► 401 challenge
//!   ▼
//! base64 → NegTokenInit → krb5 mech → AP-REQ
//!   │ any decode failure ────────────────────────────► 401 reject
//!   ▼
//! decrypt ticket (keytab) → decrypt authenticator
//!   │ any decrypt failure ───────────────────────────► 401 reject
//!   ▼
//! TicketValidator (match, skew, replay, validity)
//!   │ Rejected ──────────────────────────────────────► 401 reject
//!   ▼
//! Accepted → AuthenticatedIdentity in extensions → downstream handler
//! ```
//!
//! # Responses
//!
//! | Outcome   | Status | `WWW-Authenticate`                 | Body              |
//! |-----------|--------|------------------------------------|-------------------|
//! | challenge | 401    | `Negotiate`                        | `Unauthorised.\n` |
//! | reject    | 401    | `Negotiate oQcwBaADCgEC`           | `Unauthorised.\n` |
//! | accept    | from handler | `Negotiate oRQwEqADCgEAoQsGCSqGSIb3EgECAg==` | from handler |
//!
//! Every rejection produces the identical artifact. The reason is logged
//! server-side with the client address and never echoed to the client.
//!
//! # Bypassed Endpoints
//!
//! Paths listed in the gate's bypass list (default `/health`) are forwarded
//! without authentication so health probes keep working. Matching is exact
//! against `request.uri().path()`.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::ip::client_addr;
use crate::config::GateConfig;
use crate::error::AuthError;
use crate::identity::AuthenticatedIdentity;
use crate::krb5::{DecodeError, Keytab, TicketCrypto, TokenDecoder};
use crate::metrics::{self, outcomes};
use crate::negotiate::{
    ACCEPT_COMPLETED_HEADER, CHALLENGE_HEADER, REJECT_HEADER, UNAUTHORISED_BODY, decode_token,
    parse_negotiate_header,
};
use crate::validator::{AuthDecision, TicketValidator, ValidationContext};

/// Default paths that bypass authentication.
const DEFAULT_BYPASS_PATHS: [&str; 1] = ["/health"];

/// Result of examining one request's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// No Negotiate credential: prompt the client to start negotiation.
    Challenge,
    /// Credential presented and refused.
    Reject(AuthError),
    /// Credential presented and accepted.
    Accept(AuthenticatedIdentity),
}

struct GateInner {
    decoder: Arc<dyn TokenDecoder>,
    crypto: Arc<dyn TicketCrypto>,
    keytab: Arc<Keytab>,
    validator: TicketValidator,
    bypass_paths: Vec<String>,
    log_rejections: bool,
}

/// SPNEGO authentication layer.
///
/// Cheap to clone: all state sits behind one `Arc`, and the replay cache is
/// shared through the validator.
#[derive(Clone)]
pub struct AuthenticationGate {
    inner: Arc<GateInner>,
}

impl AuthenticationGate {
    /// Create a gate with default bypass paths and rejection logging on.
    ///
    /// # Arguments
    ///
    /// * `decoder` - SPNEGO/GSS-API token decoder
    /// * `crypto` - Ticket and authenticator decryption
    /// * `keytab` - Service keys for ticket decryption
    /// * `validator` - AP-REQ acceptance rules with the shared replay cache
    pub fn new(
        decoder: Arc<dyn TokenDecoder>,
        crypto: Arc<dyn TicketCrypto>,
        keytab: Arc<Keytab>,
        validator: TicketValidator,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                decoder,
                crypto,
                keytab,
                validator,
                bypass_paths: DEFAULT_BYPASS_PATHS
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
                log_rejections: true,
            }),
        }
    }

    /// Create a gate using the bypass and logging settings from `config`.
    pub fn from_config(
        config: &GateConfig,
        decoder: Arc<dyn TokenDecoder>,
        crypto: Arc<dyn TicketCrypto>,
        keytab: Arc<Keytab>,
        validator: TicketValidator,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                decoder,
                crypto,
                keytab,
                validator,
                bypass_paths: config.bypass_paths.clone(),
                log_rejections: config.log_rejections,
            }),
        }
    }

    /// Replace the bypass path list.
    pub fn with_bypass_paths(self, bypass_paths: Vec<String>) -> Self {
        self.rebuild(|inner| inner.bypass_paths = bypass_paths)
    }

    /// Enable or disable rejection log lines. Rejections still happen.
    pub fn with_rejection_logging(self, enabled: bool) -> Self {
        self.rebuild(|inner| inner.log_rejections = enabled)
    }

    fn rebuild(self, update: impl FnOnce(&mut GateInner)) -> Self {
        let mut inner = GateInner {
            decoder: self.inner.decoder.clone(),
            crypto: self.inner.crypto.clone(),
            keytab: self.inner.keytab.clone(),
            validator: self.inner.validator.clone(),
            bypass_paths: self.inner.bypass_paths.clone(),
            log_rejections: self.inner.log_rejections,
        };
        update(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn validator(&self) -> &TicketValidator {
        &self.inner.validator
    }

    fn is_bypassed(&self, path: &str) -> bool {
        self.inner.bypass_paths.iter().any(|p| p == path)
    }

    /// Examine the `Authorization` header and decide the request's fate.
    ///
    /// Synchronous and self-contained: decoding, decryption and validation
    /// are bounded CPU work, and the replay-cache lock is released before
    /// this returns.
    pub fn authenticate(&self, headers: &HeaderMap) -> GateOutcome {
        let Some(token) = parse_negotiate_header(headers.get(AUTHORIZATION)) else {
            return GateOutcome::Challenge;
        };

        let started = Instant::now();
        let outcome = match self.verify_token(token) {
            Ok(identity) => GateOutcome::Accept(identity),
            Err(e) => GateOutcome::Reject(e),
        };
        metrics::record_validation_duration(started.elapsed().as_secs_f64());

        outcome
    }

    fn verify_token(&self, token: &str) -> Result<AuthenticatedIdentity, AuthError> {
        let inner = &self.inner;
        let raw = decode_token(token)?;

        let negotiation = inner.decoder.decode_negotiation(&raw).map_err(|e| {
            AuthError::malformed(format!(
                "SPNEGO negotiation token is not a NegTokenInit: {e}"
            ))
        })?;
        if !negotiation.initial {
            return Err(AuthError::malformed(
                "SPNEGO negotiation token is not a NegTokenInit",
            ));
        }
        if !negotiation.prefers_kerberos() {
            return Err(AuthError::unsupported_mechanism(
                "SPNEGO OID of MechToken is not of type KRB5",
            ));
        }

        let ap_req = inner
            .decoder
            .decode_ap_req(&negotiation.mech_token)
            .map_err(|e| match e {
                DecodeError::NotApReq => AuthError::unsupported_mechanism(
                    "MechToken does not contain an AP_REQ - KRB_AP_ERR_MSG_TYPE",
                ),
                DecodeError::Malformed(msg) => {
                    AuthError::malformed(format!("SPNEGO error unmarshaling MechToken: {msg}"))
                }
            })?;

        let ticket = inner
            .crypto
            .decrypt_ticket(&inner.keytab, &ap_req.ticket)
            .map_err(|e| {
                AuthError::decryption(format!(
                    "SPNEGO error decrypting the service ticket provided: {e}"
                ))
            })?;

        let authenticator = inner
            .crypto
            .decrypt_authenticator(&ticket.session_key, &ap_req.authenticator)
            .map_err(|e| {
                AuthError::decryption(format!(
                    "SPNEGO error decrypting the authenticator provided: {e}"
                ))
            })?;

        let ctx = ValidationContext::from_parts(&ap_req, &ticket, &authenticator);
        match inner.validator.validate(&ctx) {
            AuthDecision::Accepted { principal, realm } => {
                Ok(AuthenticatedIdentity::new(principal, realm))
            }
            AuthDecision::Rejected { reason, message } => Err(AuthError::new(
                reason,
                format!("SPNEGO Kerberos authentication failed: {message}"),
            )),
        }
    }
}

impl<S> Layer<S> for AuthenticationGate {
    type Service = AuthenticationGateService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationGateService {
            inner,
            gate: self.clone(),
        }
    }
}

/// Authentication gate service wrapper.
#[derive(Clone)]
pub struct AuthenticationGateService<S> {
    inner: S,
    gate: AuthenticationGate,
}

impl<S> Service<Request<Body>> for AuthenticationGateService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        if self.gate.is_bypassed(req.uri().path()) {
            debug!(path = %req.uri().path(), "Bypassing SPNEGO authentication");
            metrics::record_outcome(outcomes::BYPASSED, "none");
            return Box::pin(async move { inner.call(req).await });
        }

        // Only the gate may vouch for an identity.
        req.extensions_mut().remove::<AuthenticatedIdentity>();

        match self.gate.authenticate(req.headers()) {
            GateOutcome::Challenge => {
                debug!(
                    client_addr = %client_addr(&req),
                    "No Negotiate credential, sending challenge"
                );
                metrics::record_outcome(outcomes::CHALLENGED, "missing_credential");
                Box::pin(async { Ok(challenge_response()) })
            }
            GateOutcome::Reject(err) => {
                if self.gate.inner.log_rejections {
                    warn!(
                        client_addr = %client_addr(&req),
                        reason = %err.reason,
                        krb_error_code = err.reason.krb_error_code(),
                        message = %err.message,
                        "SPNEGO authentication rejected"
                    );
                }
                metrics::record_outcome(outcomes::REJECTED, err.reason.as_str());
                Box::pin(async { Ok(reject_response()) })
            }
            GateOutcome::Accept(identity) => {
                debug!(
                    principal = %identity.principal,
                    realm = %identity.realm,
                    "SPNEGO authentication succeeded"
                );
                metrics::record_outcome(outcomes::ACCEPTED, "none");
                req.extensions_mut().insert(identity);

                Box::pin(async move {
                    let mut response = inner.call(req).await?;
                    response.headers_mut().insert(
                        WWW_AUTHENTICATE,
                        HeaderValue::from_static(ACCEPT_COMPLETED_HEADER),
                    );
                    Ok(response)
                })
            }
        }
    }
}

/// 401 prompting the client to begin Negotiate authentication.
pub fn challenge_response() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, CHALLENGE_HEADER)],
        UNAUTHORISED_BODY,
    )
        .into_response()
}

/// 401 carrying the SPNEGO reject token. Identical for every failure reason.
pub fn reject_response() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, REJECT_HEADER)],
        UNAUTHORISED_BODY,
    )
        .into_response()
}
