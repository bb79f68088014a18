//! Kerberos AP-REQ acceptance rules.
//!
//! [`TicketValidator`] applies the checks below to an already-decrypted
//! ticket and authenticator. Checks run in this order and stop at the first
//! failure:
//!
//! | # | Check            | Failure                      |
//! |---|------------------|------------------------------|
//! | 1 | principal match  | [`RejectReason::BadMatch`]    |
//! | 2 | clock skew       | [`RejectReason::ClockSkew`]   |
//! | 3 | replay cache     | [`RejectReason::Replay`]      |
//! | 4 | not yet valid    | [`RejectReason::NotYetValid`] |
//! | 5 | expired          | [`RejectReason::Expired`]     |
//!
//! The wall clock is read once per validation. The skew tolerance doubles as
//! the replay window: authenticators further apart than the tolerance fail
//! check 2, so the cache never needs to remember them.
//!
//! # Client Address Verification
//!
//! Ticket client addresses (`caddr`) are **not** checked against the peer
//! address. `KRB_AP_ERR_BADADDR` is never produced. Deployments that need
//! address binding must enforce it in front of the gate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use subtle::ConstantTimeEq;

use crate::error::RejectReason;
use crate::krb5::{ApReq, Authenticator, DecryptedTicket, PrincipalName, TicketFlags};
use crate::replay::{Fingerprint, ReplayCache, ReplayCheck};

/// Everything the acceptance rules look at, for one request.
///
/// Built fresh per request and only read during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    /// Client principal asserted by the authenticator.
    pub client_principal: PrincipalName,
    /// Client realm asserted by the authenticator.
    pub client_realm: String,
    /// Authenticator `ctime + cusec`.
    pub authenticator_time: DateTime<Utc>,
    /// Client principal bound inside the decrypted ticket.
    pub ticket_client_principal: PrincipalName,
    /// Ticket start time (auth time when the ticket has none).
    pub ticket_start_time: DateTime<Utc>,
    pub ticket_end_time: DateTime<Utc>,
    pub ticket_flags: TicketFlags,
    pub service_principal: PrincipalName,
    pub service_realm: String,
}

impl ValidationContext {
    /// Assemble a context from the decoded AP-REQ and its decrypted parts.
    pub fn from_parts(
        ap_req: &ApReq,
        ticket: &DecryptedTicket,
        authenticator: &Authenticator,
    ) -> Self {
        Self {
            client_principal: authenticator.client_principal.clone(),
            client_realm: authenticator.client_realm.clone(),
            authenticator_time: authenticator.authenticator_time(),
            ticket_client_principal: ticket.client_principal.clone(),
            ticket_start_time: ticket.effective_start_time(),
            ticket_end_time: ticket.end_time,
            ticket_flags: ticket.flags,
            service_principal: ap_req.ticket.service_principal.clone(),
            service_realm: ap_req.ticket.realm.clone(),
        }
    }

    /// Replay-cache key for this presentation.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            client_principal: self.client_principal.components.clone(),
            client_realm: self.client_realm.clone(),
            service_principal: self.service_principal.components.clone(),
            authenticator_time: self.authenticator_time,
        }
    }
}

/// Result of validating one [`ValidationContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Accepted { principal: String, realm: String },
    Rejected { reason: RejectReason, message: String },
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accepted { .. })
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            AuthDecision::Accepted { .. } => None,
            AuthDecision::Rejected { reason, .. } => Some(*reason),
        }
    }

    fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        AuthDecision::Rejected {
            reason,
            message: message.into(),
        }
    }
}

/// Applies the AP-REQ acceptance rules, recording fresh authenticators in a
/// shared [`ReplayCache`].
#[derive(Debug, Clone)]
pub struct TicketValidator {
    replay_cache: Arc<ReplayCache>,
    max_skew: Duration,
    skew: TimeDelta,
}

impl TicketValidator {
    /// Create a validator whose skew tolerance is the cache's window.
    ///
    /// The tolerance and the replay window are one value, so a presentation
    /// old enough to have left the cache is always rejected as skewed.
    pub fn new(replay_cache: Arc<ReplayCache>) -> Self {
        let max_skew = replay_cache.window();
        // Out-of-range tolerances clamp to ~1000 years, i.e. effectively unbounded.
        let skew = TimeDelta::from_std(max_skew).unwrap_or_else(|_| TimeDelta::weeks(52_000));
        Self {
            replay_cache,
            max_skew,
            skew,
        }
    }

    pub fn max_skew(&self) -> Duration {
        self.max_skew
    }

    pub fn replay_cache(&self) -> &Arc<ReplayCache> {
        &self.replay_cache
    }

    /// Validate against the current UTC wall clock.
    pub fn validate(&self, ctx: &ValidationContext) -> AuthDecision {
        self.validate_at(ctx, Utc::now())
    }

    /// Validate against an explicit `now`.
    pub fn validate_at(&self, ctx: &ValidationContext, now: DateTime<Utc>) -> AuthDecision {
        let d = self.skew;

        if !principals_match(&ctx.client_principal, &ctx.ticket_client_principal) {
            return AuthDecision::rejected(
                RejectReason::BadMatch,
                "CName in Authenticator does not match that in service ticket",
            );
        }

        // TODO: compare ticket caddr with the peer address once the decrypt
        // collaborator exposes ticket addresses (KRB_AP_ERR_BADADDR).

        if (now - ctx.authenticator_time).abs() > d {
            return AuthDecision::rejected(
                RejectReason::ClockSkew,
                format!(
                    "Clock skew with client too large. Greater than {} seconds",
                    self.max_skew.as_secs()
                ),
            );
        }

        match self
            .replay_cache
            .check_and_record_at(now, self.max_skew, ctx.fingerprint())
        {
            ReplayCheck::Fresh => {}
            ReplayCheck::Replay => {
                return AuthDecision::rejected(RejectReason::Replay, "Replay detected");
            }
            ReplayCheck::Saturated => {
                return AuthDecision::rejected(
                    RejectReason::ReplayCacheFull,
                    "Replay cache is full, cannot record authenticator",
                );
            }
        }

        if ctx.ticket_start_time - now > d || ctx.ticket_flags.is_set(TicketFlags::INVALID) {
            return AuthDecision::rejected(
                RejectReason::NotYetValid,
                "Service ticket provided is not yet valid",
            );
        }

        if now - ctx.ticket_end_time > d {
            return AuthDecision::rejected(
                RejectReason::Expired,
                "Service ticket provided has expired",
            );
        }

        AuthDecision::Accepted {
            principal: ctx.client_principal.to_principal_string(),
            realm: ctx.client_realm.clone(),
        }
    }
}

/// Component-wise principal comparison in constant time per component.
fn principals_match(a: &PrincipalName, b: &PrincipalName) -> bool {
    a.components.len() == b.components.len()
        && a.components
            .iter()
            .zip(&b.components)
            .all(|(x, y)| bool::from(x.as_bytes().ct_eq(y.as_bytes())))
}
