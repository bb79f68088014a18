//! Test doubles for the token codec and ticket crypto.
//!
//! Tokens are JSON instead of DER, and "encryption" prefixes the plaintext
//! with the key bytes. Decryption fails when the prefix does not match the
//! key, which is enough to exercise every failure path of the gate.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use spnego_gate::krb5::{
    ApReq, Authenticator, CryptoError, DecodeError, DecryptedTicket, EncryptedData, KRB5_MECH_OID,
    Keytab, NegotiationToken, PrincipalName, ServiceKey, SessionKey, Ticket, TicketCrypto,
    TicketFlags, TokenDecoder,
};
use spnego_gate::{AuthenticationGate, ReplayCache, TicketValidator};

pub const SERVICE: &str = "HTTP/www.example.com";
pub const REALM: &str = "EXAMPLE.COM";
pub const SERVICE_KEY: &[u8] = b"service-long-term-key";
pub const SESSION_KEY: &[u8] = b"per-ticket-session-key";
pub const AES256: i32 = 18;
pub const NTLM_MECH_OID: &str = "1.3.6.1.4.1.311.2.2.10";

const KRB_AP_REQ: u8 = 14;
const KRB_ERROR: u8 = 30;

/// Mechanism token envelope: message type plus the AP-REQ when present.
#[derive(Serialize, Deserialize)]
struct MechToken {
    msg_type: u8,
    ap_req: Option<ApReq>,
}

pub struct JsonTokenDecoder;

impl TokenDecoder for JsonTokenDecoder {
    fn decode_negotiation(&self, raw: &[u8]) -> Result<NegotiationToken, DecodeError> {
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    fn decode_ap_req(&self, mech_token: &[u8]) -> Result<ApReq, DecodeError> {
        let token: MechToken =
            serde_json::from_slice(mech_token).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        match (token.msg_type, token.ap_req) {
            (KRB_AP_REQ, Some(ap_req)) => Ok(ap_req),
            _ => Err(DecodeError::NotApReq),
        }
    }
}

pub struct PrefixCrypto;

impl TicketCrypto for PrefixCrypto {
    fn decrypt_ticket(
        &self,
        keytab: &Keytab,
        ticket: &Ticket,
    ) -> Result<DecryptedTicket, CryptoError> {
        let key = keytab
            .key_for(
                &ticket.service_principal,
                &ticket.realm,
                ticket.enc_part.etype,
                ticket.enc_part.kvno,
            )
            .ok_or_else(|| CryptoError::KeyNotFound {
                principal: ticket.service_principal.to_principal_string(),
                realm: ticket.realm.clone(),
                etype: ticket.enc_part.etype,
            })?;
        open(&key.value, &ticket.enc_part.cipher)
    }

    fn decrypt_authenticator(
        &self,
        session_key: &SessionKey,
        authenticator: &EncryptedData,
    ) -> Result<Authenticator, CryptoError> {
        open(&session_key.value, &authenticator.cipher)
    }
}

fn seal<T: Serialize>(key: &[u8], plaintext: &T) -> Vec<u8> {
    let mut cipher = key.to_vec();
    cipher.extend(serde_json::to_vec(plaintext).unwrap());
    cipher
}

fn open<T: for<'de> Deserialize<'de>>(key: &[u8], cipher: &[u8]) -> Result<T, CryptoError> {
    let plaintext = cipher
        .strip_prefix(key)
        .ok_or_else(|| CryptoError::Decrypt("integrity check failed".to_string()))?;
    serde_json::from_slice(plaintext).map_err(|e| CryptoError::Decode(e.to_string()))
}

pub fn keytab() -> Keytab {
    let mut keytab = Keytab::new();
    keytab.add_entry(
        &PrincipalName::parse(PrincipalName::NT_SRV_INST, SERVICE),
        REALM,
        ServiceKey {
            kvno: 1,
            etype: AES256,
            value: SERVICE_KEY.to_vec(),
        },
    );
    keytab
}

/// Route gate logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Gate over a fresh replay cache with a five-minute window.
pub fn gate() -> AuthenticationGate {
    init_tracing();
    let cache = Arc::new(ReplayCache::new(Duration::from_secs(300)));
    AuthenticationGate::new(
        Arc::new(JsonTokenDecoder),
        Arc::new(PrefixCrypto),
        Arc::new(keytab()),
        TicketValidator::new(cache),
    )
}

/// One client presentation of a service ticket, with knobs for every
/// field the gate inspects.
#[derive(Clone)]
pub struct Presentation {
    pub client: String,
    pub realm: String,
    pub ticket_client: Option<String>,
    pub service: String,
    pub ctime: DateTime<Utc>,
    pub cusec: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub flags: TicketFlags,
    pub mech: String,
    pub initial: bool,
    pub msg_type: u8,
    pub service_key: Vec<u8>,
    pub session_key: Vec<u8>,
    pub authenticator_key: Vec<u8>,
}

impl Presentation {
    /// `alice@EXAMPLE.COM` presenting a valid ticket right now.
    pub fn alice() -> Self {
        let now = Utc::now();
        Self {
            client: "alice".to_string(),
            realm: REALM.to_string(),
            ticket_client: None,
            service: SERVICE.to_string(),
            ctime: now,
            cusec: 0,
            start_time: Some(now - TimeDelta::hours(1)),
            end_time: now + TimeDelta::hours(9),
            flags: TicketFlags::with(&[TicketFlags::FORWARDABLE, TicketFlags::PRE_AUTHENT]),
            mech: KRB5_MECH_OID.to_string(),
            initial: true,
            msg_type: KRB_AP_REQ,
            service_key: SERVICE_KEY.to_vec(),
            session_key: SESSION_KEY.to_vec(),
            authenticator_key: SESSION_KEY.to_vec(),
        }
    }

    pub fn with_ctime(mut self, ctime: DateTime<Utc>) -> Self {
        self.ctime = ctime;
        self
    }

    pub fn not_ap_req(mut self) -> Self {
        self.msg_type = KRB_ERROR;
        self
    }

    /// Raw negotiation token bytes.
    pub fn token_bytes(&self) -> Vec<u8> {
        let client = PrincipalName::parse(PrincipalName::NT_PRINCIPAL, &self.client);
        let ticket_client = match &self.ticket_client {
            Some(name) => PrincipalName::parse(PrincipalName::NT_PRINCIPAL, name),
            None => client.clone(),
        };

        let decrypted = DecryptedTicket {
            session_key: SessionKey {
                etype: AES256,
                value: self.session_key.clone(),
            },
            client_principal: ticket_client,
            client_realm: self.realm.clone(),
            auth_time: self.ctime - TimeDelta::hours(1),
            start_time: self.start_time,
            end_time: self.end_time,
            flags: self.flags,
        };
        let authenticator = Authenticator {
            client_principal: client,
            client_realm: self.realm.clone(),
            ctime: self.ctime,
            cusec: self.cusec,
        };
        let ap_req = ApReq {
            ticket: Ticket {
                realm: REALM.to_string(),
                service_principal: PrincipalName::parse(PrincipalName::NT_SRV_INST, &self.service),
                enc_part: EncryptedData {
                    etype: AES256,
                    kvno: Some(1),
                    cipher: seal(&self.service_key, &decrypted),
                },
            },
            authenticator: EncryptedData {
                etype: AES256,
                kvno: None,
                cipher: seal(&self.authenticator_key, &authenticator),
            },
        };
        let mech_token = serde_json::to_vec(&MechToken {
            msg_type: self.msg_type,
            ap_req: (self.msg_type == KRB_AP_REQ).then_some(ap_req),
        })
        .unwrap();

        serde_json::to_vec(&NegotiationToken {
            initial: self.initial,
            mech_types: vec![self.mech.clone()],
            mech_token,
        })
        .unwrap()
    }

    /// `Authorization` header value.
    pub fn header(&self) -> String {
        format!("Negotiate {}", STANDARD.encode(self.token_bytes()))
    }
}

pub fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
