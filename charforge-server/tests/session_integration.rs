//! End-to-end session tests
//!
//! Real Gemini client and webhook notifier pointed at wiremock, memory
//! storage, driven through the axum router and the IPC socket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use charforge_core::config::GatewayConfig;
use charforge_core::generation::{GeminiClientConfig, GeminiGenerationClient};
use charforge_core::ipc::{CharforgeRequest, CharforgeResponse};
use charforge_core::store::seed_default_worldviews;
use charforge_core::{CharforgeConfig, Stores, WebhookNotifier};
use charforge_server::http::build_router;
use charforge_server::router::AppState;
use charforge_server::subsystems::watchdog::{InactivityWatchdog, WatchdogSettings};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG: &str = r#"
    [service]
    socket_path = "/tmp/charforge-integration.sock"
    log_level = "debug"

    [database]
    url = "postgresql://localhost/unused"
    max_connections = 1

    [storage]
    backend = "memory"

    [generation]
    model = "gemini-test"
    max_retries = 0
    retry_delay_ms = 1
    timeout_seconds = 5

    [gateway]
    notify_url = "http://127.0.0.1:9/notify"
    timeout_seconds = 5
"#;

fn gemini_text(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    })
}

/// Wire an AppState to the given mock servers.
async fn make_state(gemini: &MockServer, gateway: &MockServer) -> Arc<AppState> {
    let config = CharforgeConfig::from_toml_str(CONFIG).unwrap();

    let stores = Stores::memory();
    seed_default_worldviews(stores.worldviews.as_ref())
        .await
        .unwrap();
    // scenario worldview: 세계관1 described as "D"
    stores.worldviews.update("세계관1", "D").await.unwrap();

    let mut client_config =
        GeminiClientConfig::new(Some("test-key".to_string()), "gemini-test".to_string());
    client_config.max_retries = 0;
    client_config.retry_delay_ms = 1;
    let generator = GeminiGenerationClient::with_base_url(client_config, gemini.uri()).unwrap();

    let notifier = WebhookNotifier::new(&GatewayConfig {
        notify_url: format!("{}/notify", gateway.uri()),
        timeout_seconds: 5,
    })
    .unwrap();

    Arc::new(AppState::new(
        config,
        stores,
        None,
        Arc::new(generator),
        Arc::new(notifier),
    ))
}

async fn post_event(state: &Arc<AppState>, event: Value) -> (StatusCode, Value) {
    let app = build_router(state.clone());
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .header("content-type", "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ===========================================================================
// TEST 1: start → message → generate → save, with the exact backend payloads
// ===========================================================================
#[tokio::test]
async fn test_full_session_over_http() {
    let gemini = MockServer::start().await;
    let gateway = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notify"))
        .and(body_partial_json(json!({ "owner": "U1" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&gateway)
        .await;

    // conversation turn: seed then the user's line
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/gemini-test:generateContent$"))
        .and(body_partial_json(json!({
            "contents": [
                { "role": "model" },
                { "role": "user", "parts": [{ "text": "나는 용사다" }] }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("알겠습니다...")))
        .up_to_n_times(1)
        .mount(&gemini)
        .await;

    let state = make_state(&gemini, &gateway).await;

    let (status, body) = post_event(
        &state,
        json!({ "action": "start", "owner": "U1", "worldview": "세계관1" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "start failed: {}", body);

    let (status, body) = post_event(
        &state,
        json!({ "action": "message", "owner": "U1", "text": "나는 용사다", "private_channel": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "message failed: {}", body);
    assert_eq!(body["data"]["reply"], "알겠습니다...");

    let session = state.registry().get("U1").unwrap();
    assert_eq!(session.transcript.len(), 2);

    // finalize: the system instruction carries "D" and the directive is last
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/gemini-test:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("P")))
        .mount(&gemini)
        .await;

    let (status, body) = post_event(&state, json!({ "action": "generate", "owner": "U1" })).await;
    assert_eq!(status, StatusCode::OK, "generate failed: {}", body);
    assert_eq!(body["data"]["profile"], "P");
    assert_eq!(body["data"]["worldview"], "세계관1");
    assert!(state.registry().get("U1").is_none());

    let requests = gemini.received_requests().await.unwrap();
    let last: Value = serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    let instruction = last["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(instruction.contains("\nD\n"));
    let contents = last["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 4);
    assert_eq!(contents[3]["role"], "user");

    let (status, _) = post_event(
        &state,
        json!({ "action": "save_profile", "owner": "U1", "character_name": "아린" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = post_event(
        &state,
        json!({ "action": "load_profile", "owner": "U1", "character_name": "아린" }),
    )
    .await;
    assert_eq!(body["data"]["profile"], "P");
}

// ===========================================================================
// TEST 2: gateway refuses delivery → start rolled back
// ===========================================================================
#[tokio::test]
async fn test_unreachable_start_is_rolled_back() {
    let gemini = MockServer::start().await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&gateway)
        .await;

    let state = make_state(&gemini, &gateway).await;

    let (status, body) = post_event(
        &state,
        json!({ "action": "start", "owner": "U2", "worldview": "세계관1" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "delivery_unreachable");
    assert!(state.registry().get("U2").is_none());
}

// ===========================================================================
// TEST 3: backend failure keeps the session for a retry
// ===========================================================================
#[tokio::test]
async fn test_backend_failure_preserves_session() {
    let gemini = MockServer::start().await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&gemini)
        .await;

    let state = make_state(&gemini, &gateway).await;
    post_event(
        &state,
        json!({ "action": "start", "owner": "U", "worldview": "세계관2" }),
    )
    .await;

    let (status, body) = post_event(
        &state,
        json!({ "action": "message", "owner": "U", "text": "hi", "private_channel": true }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "generation_failed");
    assert!(!body["data"]["reply"].as_str().unwrap().contains("boom"));
    assert!(state.registry().get("U").is_some());
}

// ===========================================================================
// TEST 4: watchdog warns through the webhook exactly once
// ===========================================================================
#[tokio::test]
async fn test_watchdog_warns_over_webhook() {
    let gemini = MockServer::start().await;
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&gateway)
        .await;

    let state = make_state(&gemini, &gateway).await;
    post_event(
        &state,
        json!({ "action": "start", "owner": "U", "worldview": "세계관1" }),
    )
    .await;

    let notifier = WebhookNotifier::new(&GatewayConfig {
        notify_url: format!("{}/notify", gateway.uri()),
        timeout_seconds: 5,
    })
    .unwrap();
    let watchdog = InactivityWatchdog::new(
        state.registry().clone(),
        Arc::new(notifier),
        WatchdogSettings {
            interval: Duration::from_secs(60),
            idle_threshold: Duration::from_secs(180),
            reap_after_warning: None,
        },
    );

    let later = chrono::Utc::now() + chrono::Duration::seconds(200);
    assert_eq!(watchdog.scan(later).await.warned, 1);
    assert_eq!(watchdog.scan(later).await.warned, 0);
    assert!(state.registry().get("U").unwrap().warned_idle);
}

// ===========================================================================
// TEST 5: IPC socket round trip (length-prefixed MessagePack)
// ===========================================================================
#[tokio::test]
async fn test_ipc_ping_and_bad_frame() {
    let gemini = MockServer::start().await;
    let gateway = MockServer::start().await;
    let state = make_state(&gemini, &gateway).await;

    let socket_path = format!("/tmp/charforge-ipc-{}.sock", std::process::id());
    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let server = {
        let socket_path = socket_path.clone();
        tokio::spawn(async move {
            charforge_server::server::run_unix_server(&socket_path, state, rx).await
        })
    };

    let stream = {
        let mut attempt = 0;
        loop {
            match tokio::net::UnixStream::connect(&socket_path).await {
                Ok(s) => break s,
                Err(_) if attempt < 50 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(e) => panic!("IPC server did not come up: {}", e),
            }
        }
    };
    let codec = LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed = Framed::new(stream, codec);

    let ping = rmp_serde::to_vec_named(&CharforgeRequest::Ping).unwrap();
    framed.send(Bytes::from(ping)).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let resp: CharforgeResponse = rmp_serde::from_slice(&frame).unwrap();
    assert!(resp.is_ok());

    framed.send(Bytes::from_static(b"\xc1not msgpack")).await.unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let resp: CharforgeResponse = rmp_serde::from_slice(&frame).unwrap();
    assert!(!resp.is_ok());
    assert!(resp.error.unwrap().contains("Deserialization error"));

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(!std::path::Path::new(&socket_path).exists());
}
