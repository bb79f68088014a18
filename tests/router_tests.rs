//! Tests for the assembled router, shared state and concurrent replay handling.
//!
//! Run with: `cargo test --test router_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::http::header::WWW_AUTHENTICATE;
use axum::routing::get;
use serde_json::Value;
use tower::ServiceExt;

use common::{JsonTokenDecoder, Presentation, PrefixCrypto, body_string, keytab};
use spnego_gate::{GateConfig, GateState, build_router};

fn state(config: GateConfig) -> GateState {
    common::init_tracing();
    GateState::new(
        config,
        Arc::new(JsonTokenDecoder),
        Arc::new(PrefixCrypto),
        Arc::new(keytab()),
    )
}

fn lazy_config() -> GateConfig {
    GateConfig {
        replay_sweep_interval: None,
        ..GateConfig::default()
    }
}

#[tokio::test]
async fn test_health_is_public_and_reports_cache() {
    let state = state(lazy_config());
    let app = build_router(&state, Router::new());

    let header = Presentation::alice().header();
    let whoami = app
        .clone()
        .oneshot(common::get("/whoami", Some(&header)))
        .await
        .unwrap();
    assert_eq!(whoami.status(), StatusCode::OK);

    let response = app.oneshot(common::get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["replay_cache_entries"], 1);
}

#[tokio::test]
async fn test_whoami_echoes_identity() {
    let state = state(lazy_config());
    let app = build_router(&state, Router::new());
    let header = Presentation::alice().header();

    let response = app
        .oneshot(common::get("/whoami", Some(&header)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(WWW_AUTHENTICATE));
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["principal"], "alice");
    assert_eq!(json["realm"], "EXAMPLE.COM");
    assert_eq!(json["authenticated"], true);
}

#[tokio::test]
async fn test_caller_routes_are_protected() {
    let state = state(lazy_config());
    let app = build_router(&state, Router::new().route("/api", get(|| async { "secret" })));

    let response = app.oneshot(common::get("/api", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[WWW_AUTHENTICATE], "Negotiate");
}

#[tokio::test]
async fn test_state_shares_one_cache_across_clones() {
    let state = state(lazy_config());
    let header = Presentation::alice().header();

    let first = build_router(&state.clone(), Router::new())
        .oneshot(common::get("/whoami", Some(&header)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // A second router built from the same state sees the recorded fingerprint.
    let second = build_router(&state, Router::new())
        .oneshot(common::get("/whoami", Some(&header)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sweeper_lifecycle() {
    let config = GateConfig {
        replay_sweep_interval: Some(Duration::from_millis(10)),
        ..GateConfig::default()
    };
    let state = state(config);
    assert!(state.has_sweeper());

    tokio::time::timeout(Duration::from_secs(5), state.shutdown())
        .await
        .expect("sweeper should stop promptly");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_admit_exactly_one() {
    let state = state(lazy_config());
    let app = build_router(&state, Router::new());
    let header = Presentation::alice().header();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let app = app.clone();
        let header = header.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(common::get("/whoami", Some(&header)))
                .await
                .unwrap()
                .status()
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() == StatusCode::OK {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(state.replay_cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_clients_all_admitted() {
    let state = state(lazy_config());
    let app = build_router(&state, Router::new());

    let mut handles = Vec::new();
    for i in 0..16 {
        let app = app.clone();
        let mut presentation = Presentation::alice();
        presentation.client = format!("user{i}");
        let header = presentation.header();
        handles.push(tokio::spawn(async move {
            app.oneshot(common::get("/whoami", Some(&header)))
                .await
                .unwrap()
                .status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(state.replay_cache.len(), 16);
}
