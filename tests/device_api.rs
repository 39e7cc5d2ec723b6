//! Integration tests against a simulated television API.
//!
//! A local axum server stands in for the TV and records every request, so
//! the tests can assert on exact paths and payloads, exercise the
//! `sources/current` → `activities/launch` firmware fallback, and drive
//! the retry loop with a genuinely unreachable endpoint.

use std::net::TcpListener as StdTcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use chrono::Utc;
use tvctl::client::DeviceClient;
use tvctl::config::RetryPolicy;
use tvctl::error::{ClientError, PairingError};
use tvctl::pairing::{Pairing, auth_signature};
use tvctl::store::{DeviceCredential, DeviceEndpoint, Store};

/// How the simulated firmware answers `PUT /6/sources/current`.
#[derive(Clone, Copy)]
enum SourceMode {
    Ok,
    NotFound,
    ServerError,
}

struct TvState {
    volume: Mutex<(u32, bool)>,
    keys: Mutex<Vec<Value>>,
    source_puts: Mutex<Vec<Value>>,
    launches: Mutex<Vec<Value>>,
    pair_requests: Mutex<Vec<Value>>,
    grants: Mutex<Vec<Value>>,
    source_mode: SourceMode,
    grant_accept: bool,
    current_source: Option<&'static str>,
}

impl TvState {
    fn new(source_mode: SourceMode) -> Arc<Self> {
        Arc::new(Self {
            volume: Mutex::new((15, false)),
            keys: Mutex::new(Vec::new()),
            source_puts: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            pair_requests: Mutex::new(Vec::new()),
            grants: Mutex::new(Vec::new()),
            source_mode,
            grant_accept: true,
            current_source: None,
        })
    }

    /// Firmware that answers every grant with a PIN-mismatch rejection.
    fn rejecting_grants() -> Arc<Self> {
        let mut state = Arc::into_inner(Self::new(SourceMode::Ok)).unwrap();
        state.grant_accept = false;
        Arc::new(state)
    }
}

const AUTH_KEY: &str = "tvauthkey-0001";
const PAIR_TIMESTAMP: u64 = 4321;

async fn post_pair_request(
    State(state): State<Arc<TvState>>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    state.pair_requests.lock().unwrap().push(body);
    axum::Json(json!({
        "error_id": "SUCCESS",
        "auth_key": AUTH_KEY,
        "timestamp": PAIR_TIMESTAMP,
        "timeout": 60,
    }))
}

async fn post_pair_grant(
    State(state): State<Arc<TvState>>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    state.grants.lock().unwrap().push(body);
    if state.grant_accept {
        axum::Json(json!({ "error_id": "SUCCESS" })).into_response()
    } else {
        (StatusCode::FORBIDDEN, "pin mismatch").into_response()
    }
}

async fn get_volume(State(state): State<Arc<TvState>>) -> impl IntoResponse {
    let (current, muted) = *state.volume.lock().unwrap();
    axum::Json(json!({ "current": current, "max": 60, "muted": muted }))
}

async fn put_volume(
    State(state): State<Arc<TvState>>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    let current = body["current"].as_u64().unwrap_or(0) as u32;
    let muted = body["muted"].as_bool().unwrap_or(false);
    *state.volume.lock().unwrap() = (current, muted);
    StatusCode::OK
}

async fn post_key(
    State(state): State<Arc<TvState>>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    state.keys.lock().unwrap().push(body);
    StatusCode::OK
}

async fn get_source(State(state): State<Arc<TvState>>) -> impl IntoResponse {
    match state.current_source {
        Some(id) => axum::Json(json!({ "id": id })).into_response(),
        None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

async fn put_source(
    State(state): State<Arc<TvState>>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    state.source_puts.lock().unwrap().push(body);
    match state.source_mode {
        SourceMode::Ok => StatusCode::OK.into_response(),
        SourceMode::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        SourceMode::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

async fn post_launch(
    State(state): State<Arc<TvState>>,
    axum::Json(body): axum::Json<Value>,
) -> impl IntoResponse {
    state.launches.lock().unwrap().push(body);
    StatusCode::OK
}

/// Fast-failing policy so tests do not sit in the production backoff.
fn test_retry() -> RetryPolicy {
    RetryPolicy {
        retries: 2,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
    }
}

/// Spawn the simulated TV and return its API base URL.
async fn start_tv_url(state: Arc<TvState>) -> String {
    let app = Router::new()
        .route("/6/audio/volume", get(get_volume).put(put_volume))
        .route("/6/input/key", post(post_key))
        .route("/6/sources/current", get(get_source).put(put_source))
        .route("/6/activities/launch", post(post_launch))
        .route("/6/pair/request", post(post_pair_request))
        .route("/6/pair/grant", post(post_pair_grant))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/6")
}

/// Spawn the simulated TV and return a client pointed at it.
async fn start_tv(state: Arc<TvState>) -> DeviceClient {
    DeviceClient::with_base_url(
        start_tv_url(state).await,
        Some(("deviceuser".to_string(), "devicekey".to_string())),
        test_retry(),
    )
    .unwrap()
}

#[tokio::test]
async fn volume_round_trips_and_unmutes() {
    let state = TvState::new(SourceMode::Ok);
    let client = start_tv(state.clone()).await;

    client.set_volume(23).await.unwrap();
    let status = client.volume().await.unwrap();

    assert_eq!(status.current, 23);
    assert_eq!(status.max, 60);
    assert!(!status.muted);
}

#[tokio::test]
async fn send_key_posts_the_key_name() {
    let state = TvState::new(SourceMode::Ok);
    let client = start_tv(state.clone()).await;

    client.send_key("Standby").await.unwrap();

    let keys = state.keys.lock().unwrap();
    assert_eq!(keys.as_slice(), &[json!({ "key": "Standby" })]);
}

#[tokio::test]
async fn source_switch_uses_sources_current_when_supported() {
    let state = TvState::new(SourceMode::Ok);
    let client = start_tv(state.clone()).await;

    client.set_source("hdmi2").await.unwrap();

    assert_eq!(
        state.source_puts.lock().unwrap().as_slice(),
        &[json!({ "id": "hdmi2" })]
    );
    assert!(state.launches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn source_switch_falls_back_to_activities_launch_on_404() {
    let state = TvState::new(SourceMode::NotFound);
    let client = start_tv(state.clone()).await;

    client.set_source("hdmi1").await.unwrap();

    // Exactly one fallback launch with the identical payload.
    assert_eq!(state.source_puts.lock().unwrap().len(), 1);
    assert_eq!(
        state.launches.lock().unwrap().as_slice(),
        &[json!({ "id": "hdmi1" })]
    );
}

#[tokio::test]
async fn source_switch_propagates_non_404_failures() {
    let state = TvState::new(SourceMode::ServerError);
    let client = start_tv(state.clone()).await;

    let err = client.set_source("hdmi1").await.unwrap_err();

    match err {
        ClientError::Remote { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(state.launches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn current_source_is_none_when_endpoint_missing() {
    let state = TvState::new(SourceMode::Ok);
    let client = start_tv(state).await;

    assert_eq!(client.current_source().await, None);
}

#[tokio::test]
async fn pairing_persists_the_issued_credential() {
    let state = TvState::new(SourceMode::Ok);
    let url = start_tv_url(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());

    let pairing = Pairing::with_base_url(&store, test_retry(), url);
    let credential = pairing
        .pair(DeviceEndpoint::new("127.0.0.1", 1926), || {
            Ok("1234".to_string())
        })
        .await
        .unwrap();

    // The stored credential is exactly the pair the handshake minted: the
    // device id from the request step and the auth key the TV issued.
    let loaded = store.load_credential().unwrap();
    assert_eq!(loaded.username, credential.username);
    assert_eq!(loaded.password, AUTH_KEY);

    let requests = state.pair_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0]["device"]["id"].as_str().unwrap(),
        loaded.username
    );

    let grants = state.grants.lock().unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0]["auth"]["pin"], "1234");
    assert_eq!(grants[0]["auth"]["auth_timestamp"], PAIR_TIMESTAMP);
    assert_eq!(
        grants[0]["auth"]["auth_signature"].as_str().unwrap(),
        auth_signature(&PAIR_TIMESTAMP.to_string(), "1234")
    );

    let endpoint = store.load_endpoint().unwrap();
    assert_eq!(endpoint.host, "127.0.0.1");
    assert_eq!(endpoint.port, 1926);
}

#[tokio::test]
async fn rejected_grant_keeps_the_prior_credential() {
    let state = TvState::rejecting_grants();
    let url = start_tv_url(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path());

    let old = DeviceCredential {
        username: "olddevice".to_string(),
        password: "oldkey".to_string(),
        paired_at: Utc::now(),
    };
    store
        .save_pairing(&DeviceEndpoint::new("10.0.0.9", 1926), &old)
        .unwrap();

    let pairing = Pairing::with_base_url(&store, test_retry(), url);
    let err = pairing
        .pair(DeviceEndpoint::new("127.0.0.1", 1926), || {
            Ok("0000".to_string())
        })
        .await
        .unwrap_err();

    match err {
        PairingError::Rejected { status, .. } => assert_eq!(status, 403),
        other => panic!("unexpected error: {other:?}"),
    }

    let loaded = store.load_credential().unwrap();
    assert_eq!(loaded.username, "olddevice");
    assert_eq!(loaded.password, "oldkey");
}

#[tokio::test]
async fn unreachable_device_exhausts_every_attempt() {
    // Bind then immediately drop so the port is very likely refused.
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        DeviceClient::with_base_url(format!("http://{addr}/6"), None, test_retry()).unwrap();

    let err = client.volume().await.unwrap_err();
    match err {
        ClientError::Transport { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
}
