//! Fuzz testing for `Authorization: Negotiate` parsing.
//!
//! Everything here runs on attacker-controlled bytes before any
//! cryptographic check, so it must never panic:
//!
//! - `parse_negotiate_header`: scheme split and match
//! - `decode_token`: length bound and base64 decoding
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_negotiate_header -- -max_total_time=60
//! ```

#![no_main]

use axum::http::HeaderValue;
use libfuzzer_sys::fuzz_target;
use spnego_gate::negotiate::{MAX_TOKEN_LENGTH, decode_token, parse_negotiate_header};

fuzz_target!(|data: &[u8]| {
    // Not every byte string is a legal header value
    let Ok(value) = HeaderValue::from_bytes(data) else {
        return;
    };

    if let Some(token) = parse_negotiate_header(Some(&value)) {
        match decode_token(token) {
            Ok(raw) => assert!(raw.len() <= MAX_TOKEN_LENGTH),
            Err(e) => assert!(!e.message.is_empty()),
        }
    }

    // The raw string as a token on its own
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = decode_token(s);
    }
});
