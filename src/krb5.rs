//! Kerberos collaborator boundary.
//!
//! The gate never parses ASN.1 or runs Kerberos crypto itself. Those steps are
//! delegated to two traits that a deployment plugs in:
//!
//! - [`TokenDecoder`]: SPNEGO/GSS-API framing → mechanism token → AP-REQ
//! - [`TicketCrypto`]: ticket decryption with a [`Keytab`], authenticator
//!   decryption with the ticket session key
//!
//! Everything else in this module is plain data describing what those steps
//! produce.
//!
//! # Pipeline
//!
//! ```text
//! raw bytes ──decode_negotiation──► NegotiationToken
//!                                        │ mech_token
//!                                        ▼
//!                          decode_ap_req ──► ApReq
//!                                             │
//!                  ┌──────────────────────────┴──────────────────────┐
//!                  ▼                                                 ▼
//!     decrypt_ticket(keytab) ──► DecryptedTicket      decrypt_authenticator(session key)
//!                                                                    │
//!                                                                    ▼
//!                                                              Authenticator
//! ```

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OID of the Kerberos 5 GSS-API mechanism.
pub const KRB5_MECH_OID: &str = "1.2.840.113554.1.2.2";

// =============================================================================
// Principal Names
// =============================================================================

/// A Kerberos principal name.
///
/// Equality compares the name components only. The name type is a hint and
/// two principals with the same components are the same principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalName {
    pub name_type: i32,
    pub components: Vec<String>,
}

impl PrincipalName {
    /// `KRB_NT_PRINCIPAL`
    pub const NT_PRINCIPAL: i32 = 1;
    /// `KRB_NT_SRV_INST`
    pub const NT_SRV_INST: i32 = 2;

    pub fn new(name_type: i32, components: Vec<String>) -> Self {
        Self {
            name_type,
            components,
        }
    }

    /// Parse a `/`-separated principal such as `HTTP/host.example.com`.
    pub fn parse(name_type: i32, name: &str) -> Self {
        Self::new(name_type, name.split('/').map(str::to_string).collect())
    }

    /// Components joined with `/`.
    pub fn to_principal_string(&self) -> String {
        self.components.join("/")
    }
}

impl PartialEq for PrincipalName {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for PrincipalName {}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("/"))
    }
}

// =============================================================================
// Ticket Flags
// =============================================================================

/// Ticket flags bit string.
///
/// Bits use RFC 4120 numbering: bit 0 is the most significant bit of the
/// 32-bit field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFlags(pub u32);

impl TicketFlags {
    pub const FORWARDABLE: u32 = 1;
    pub const FORWARDED: u32 = 2;
    pub const PROXIABLE: u32 = 3;
    pub const PROXY: u32 = 4;
    pub const MAY_POSTDATE: u32 = 5;
    pub const POSTDATED: u32 = 6;
    pub const INVALID: u32 = 7;
    pub const RENEWABLE: u32 = 8;
    pub const INITIAL: u32 = 9;
    pub const PRE_AUTHENT: u32 = 10;

    /// Flags with the given RFC 4120 bits set. Out-of-range bits are ignored.
    pub fn with(bits: &[u32]) -> Self {
        let mut flags = Self::default();
        for &bit in bits {
            flags.set(bit);
        }
        flags
    }

    pub fn set(&mut self, bit: u32) {
        if bit < 32 {
            self.0 |= 1 << (31 - bit);
        }
    }

    pub fn is_set(&self, bit: u32) -> bool {
        bit < 32 && self.0 & (1 << (31 - bit)) != 0
    }
}

// =============================================================================
// Wire-level Shapes
// =============================================================================

/// Encrypted portion of a Kerberos message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub etype: i32,
    pub kvno: Option<u32>,
    pub cipher: Vec<u8>,
}

/// A service ticket as carried inside an AP-REQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub realm: String,
    pub service_principal: PrincipalName,
    pub enc_part: EncryptedData,
}

/// Kerberos application request: a ticket plus an encrypted authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApReq {
    pub ticket: Ticket,
    pub authenticator: EncryptedData,
}

/// Decoded SPNEGO negotiation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationToken {
    /// `true` for a NegTokenInit, `false` for a NegTokenResp.
    pub initial: bool,
    /// Mechanism OIDs in client preference order.
    pub mech_types: Vec<String>,
    /// The optimistic mechanism token.
    pub mech_token: Vec<u8>,
}

impl NegotiationToken {
    /// Whether the client's preferred mechanism is Kerberos 5.
    pub fn prefers_kerberos(&self) -> bool {
        self.mech_types.first().is_some_and(|oid| oid == KRB5_MECH_OID)
    }
}

// =============================================================================
// Decrypted Records
// =============================================================================

/// Session key carried in the ticket, used to decrypt the authenticator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKey {
    pub etype: i32,
    pub value: Vec<u8>,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("etype", &self.etype)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// The encrypted part of a service ticket after decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedTicket {
    pub session_key: SessionKey,
    pub client_principal: PrincipalName,
    pub client_realm: String,
    pub auth_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub flags: TicketFlags,
}

impl DecryptedTicket {
    /// Effective start of validity. RFC 4120 falls back to `authtime` when
    /// the ticket carries no `starttime`.
    pub fn effective_start_time(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(self.auth_time)
    }
}

/// A decrypted authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
    pub client_principal: PrincipalName,
    pub client_realm: String,
    pub ctime: DateTime<Utc>,
    /// Microsecond part of the client timestamp (0..=999_999).
    pub cusec: u32,
}

impl Authenticator {
    /// Client timestamp to microsecond resolution: `ctime + cusec`.
    pub fn authenticator_time(&self) -> DateTime<Utc> {
        self.ctime + Duration::microseconds(i64::from(self.cusec))
    }
}

// =============================================================================
// Keytab
// =============================================================================

/// A long-term service key.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceKey {
    pub kvno: u32,
    pub etype: i32,
    pub value: Vec<u8>,
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceKey")
            .field("kvno", &self.kvno)
            .field("etype", &self.etype)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// In-memory service key store, keyed by service principal and realm.
///
/// Loading keytab files is left to the deployment; this type only holds the
/// keys once they are known.
#[derive(Debug, Clone, Default)]
pub struct Keytab {
    entries: HashMap<(String, String), Vec<ServiceKey>>,
}

impl Keytab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, principal: &PrincipalName, realm: &str, key: ServiceKey) {
        self.entries
            .entry((principal.to_principal_string(), realm.to_string()))
            .or_default()
            .push(key);
    }

    /// Look up a key by principal, realm and encryption type.
    ///
    /// With no `kvno`, the highest key version for the etype wins.
    pub fn key_for(
        &self,
        principal: &PrincipalName,
        realm: &str,
        etype: i32,
        kvno: Option<u32>,
    ) -> Option<&ServiceKey> {
        let keys = self
            .entries
            .get(&(principal.to_principal_string(), realm.to_string()))?;
        let mut candidates = keys.iter().filter(|k| k.etype == etype);
        match kvno {
            Some(kvno) => candidates.find(|k| k.kvno == kvno),
            None => candidates.max_by_key(|k| k.kvno),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Failure decoding a negotiation or mechanism token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("mechanism token does not contain an AP-REQ")]
    NotApReq,
}

/// Failure decrypting a ticket or authenticator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("no key for {principal}@{realm} (etype {etype})")]
    KeyNotFound {
        principal: String,
        realm: String,
        etype: i32,
    },

    #[error("decryption failed: {0}")]
    Decrypt(String),

    #[error("decrypted structure is invalid: {0}")]
    Decode(String),
}

/// SPNEGO/GSS-API token decoding.
pub trait TokenDecoder: Send + Sync + 'static {
    /// Decode raw negotiation bytes into a negotiation token.
    fn decode_negotiation(&self, raw: &[u8]) -> Result<NegotiationToken, DecodeError>;

    /// Decode a Kerberos mechanism token, which must carry an AP-REQ.
    fn decode_ap_req(&self, mech_token: &[u8]) -> Result<ApReq, DecodeError>;
}

/// Kerberos ticket and authenticator decryption.
pub trait TicketCrypto: Send + Sync + 'static {
    /// Decrypt the ticket's encrypted part with the matching keytab key.
    fn decrypt_ticket(
        &self,
        keytab: &Keytab,
        ticket: &Ticket,
    ) -> Result<DecryptedTicket, CryptoError>;

    /// Decrypt the authenticator with the ticket session key.
    fn decrypt_authenticator(
        &self,
        session_key: &SessionKey,
        authenticator: &EncryptedData,
    ) -> Result<Authenticator, CryptoError>;
}
