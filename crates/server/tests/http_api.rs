//! Router tests driven through `tower::ServiceExt::oneshot`.
#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use bytes::Bytes;
use linkbridge_authn::{RequestSigner, RequestVerifier, SignatureConfig};
use linkbridge_server::{
    AppState, BridgeConfig, ConfigHolder, Notification, NotificationSink, SinkError,
    StaticDirectory, build_router,
};
use linkbridge_storage::{
    KeyValueStore, MemoryBackend, StorageError, StorageResult, testutil::seeded_backend,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PREFIX: &str = "/plugins/co.parabol.action";
const USER: &str = "mattermost-user-id";
const SECRET: &str = "bridge-secret";

fn signature(secret: &str) -> SignatureConfig {
    SignatureConfig::builder().secret(secret).build().unwrap()
}

fn config() -> BridgeConfig {
    BridgeConfig::builder()
        .remote_url(Url::parse("https://remote.example").unwrap())
        .signature(signature(SECRET))
        .build()
        .unwrap()
}

#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: Notification) -> Result<(), SinkError> {
        self.delivered.lock().push(notification);
        Ok(())
    }
}

struct Harness {
    router: Router,
    holder: ConfigHolder,
    backend: MemoryBackend,
    sink: Arc<RecordingSink>,
}

fn harness_with(config: BridgeConfig, backend: MemoryBackend) -> Harness {
    let holder = ConfigHolder::new(config).unwrap();
    let sink = Arc::new(RecordingSink::default());
    let state = AppState::builder()
        .config(holder.clone())
        .store(Arc::new(backend.clone()))
        .sink(sink.clone())
        .build()
        .unwrap();
    Harness { router: build_router(state), holder, backend, sink }
}

fn harness() -> Harness {
    harness_with(config(), MemoryBackend::new())
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).header(USER, "user-1").body(Body::empty()).unwrap()
}

fn link_request(method: &str, left: &str, right: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri("/links")
        .header(USER, "user-1")
        .body(Body::from(json!({ "left": left, "right": right }).to_string()))
        .unwrap()
}

/// A notification signed for `signed_path`, delivered to `/notify/{channel}`.
fn notification(secret: &str, signed_path: &str, channel: &str, body: &str) -> Request<Body> {
    let mut request = http::Request::post(signed_path)
        .header("content-type", "application/json")
        .body(Bytes::copy_from_slice(body.as_bytes()))
        .unwrap();
    RequestSigner::from_config(&signature(secret)).unwrap().sign(&mut request).unwrap();

    *request.uri_mut() = format!("/notify/{channel}").parse().unwrap();
    request.map(Body::from)
}

fn prefixed(channel: &str) -> String {
    format!("{PREFIX}/notify/{channel}")
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_link_then_list_both_directions() {
    let h = harness();

    for (left, right) in [("T1", "C1"), ("T1", "C2"), ("T2", "C1")] {
        let (status, _) = send(&h.router, link_request("POST", left, right)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    assert_eq!(send(&h.router, get("/links/left/T1")).await, (StatusCode::OK, json!(["C1", "C2"])));
    assert_eq!(
        send(&h.router, get("/links/right/C1")).await,
        (StatusCode::OK, json!(["T1", "T2"]))
    );

    let (status, _) = send(&h.router, link_request("DELETE", "T1", "C1")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(send(&h.router, get("/links/left/T1")).await.1, json!(["C2"]));
    assert_eq!(send(&h.router, get("/links/right/C1")).await.1, json!(["T2"]));

    assert_eq!(h.backend.len(), 4);
}

#[tokio::test]
async fn test_unknown_id_lists_empty() {
    let h = harness();
    assert_eq!(send(&h.router, get("/links/left/nobody")).await, (StatusCode::OK, json!([])));
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let h = harness();
    let request = Request::get("/links/left/T1").body(Body::empty()).unwrap();

    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Not authorized" }));
}

#[tokio::test]
async fn test_malformed_link_body_is_bad_request() {
    let h = harness();
    let request = Request::post("/links")
        .header(USER, "user-1")
        .body(Body::from(r#"{"left":"T1"}"#))
        .unwrap();

    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.backend.is_empty());
}

#[tokio::test]
async fn test_empty_identifier_is_bad_request() {
    let h = harness();
    let (status, body) = send(&h.router, link_request("POST", "T1", "")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("right identifier is empty"));
    assert!(h.backend.is_empty());
}

#[tokio::test]
async fn test_corrupt_record_is_internal_error_and_untouched() {
    let backend = seeded_backend(&[("teams_C1", &["T0"])]);
    backend.set("channels_T1", Bytes::from_static(b"{not json"));
    let h = harness_with(config(), backend);

    let (status, body) = send(&h.router, get("/links/left/T1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));

    // The clean side is written first; the corrupt side stops the link.
    let (status, body) = send(&h.router, link_request("POST", "T1", "C1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["retry"], json!(true));
    assert_eq!(send(&h.router, get("/links/right/C1")).await.1, json!(["T0", "T1"]));
    let stored = h.backend.snapshot().into_iter().find(|(k, _)| k == "channels_T1").unwrap().1;
    assert_eq!(stored.as_ref(), b"{not json");
}

/// Backend that never wins a compare-and-set.
struct NeverSwaps(MemoryBackend);

#[async_trait]
impl KeyValueStore for NeverSwaps {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        self.0.get(key).await
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: Option<&[u8]>,
        _new: Vec<u8>,
    ) -> StorageResult<bool> {
        Ok(false)
    }
}

/// Backend whose reads never complete.
struct Stalled;

#[async_trait]
impl KeyValueStore for Stalled {
    async fn get(&self, _key: &str) -> StorageResult<Option<Bytes>> {
        std::future::pending().await
    }

    async fn compare_and_set(
        &self,
        _key: &str,
        _expected: Option<&[u8]>,
        _new: Vec<u8>,
    ) -> StorageResult<bool> {
        Err(StorageError::internal("unreachable"))
    }
}

fn router_over(store: Arc<dyn KeyValueStore>, config: BridgeConfig) -> Router {
    let holder = ConfigHolder::new(config).unwrap();
    let state = AppState::builder().config(holder).store(store).build().unwrap();
    build_router(state)
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_is_service_unavailable() {
    let router = router_over(Arc::new(NeverSwaps(MemoryBackend::new())), config());

    let (status, body) = send(&router, link_request("POST", "T1", "C1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Service temporarily unavailable" }));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_store_hits_request_deadline() {
    let config = BridgeConfig::builder()
        .remote_url(Url::parse("https://remote.example").unwrap())
        .signature(signature(SECRET))
        .request_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let router = router_over(Arc::new(Stalled), config);

    let (status, _) = send(&router, get("/links/left/T1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&router, link_request("POST", "T1", "C1")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_signed_notification_delivered() {
    let h = harness();
    let request =
        notification(SECRET, &prefixed("C1"), "C1", r#"{"type":"meetingStarted","n":1}"#);

    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let delivered = h.sink.delivered.lock().clone();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].channel_id, "C1");
    assert_eq!(delivered[0].key_id, "parabol");
    assert_eq!(Value::Object(delivered[0].props.clone()), json!({"type":"meetingStarted","n":1}));
}

#[tokio::test]
async fn test_unsigned_notification_rejected_opaquely() {
    let h = harness();
    let request = Request::post("/notify/C1").body(Body::from("{}")).unwrap();

    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "request signature rejected" }));
    assert!(h.sink.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_wrong_secret_and_wrong_path_rejected_identically() {
    let h = harness();
    let cases = [
        notification("other-secret", &prefixed("C1"), "C1", "{}"),
        notification(SECRET, "/notify/C1", "C1", "{}"),
        notification(SECRET, &prefixed("C1"), "C2", "{}"),
    ];

    for request in cases {
        let (status, body) = send(&h.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "request signature rejected" }));
    }
    assert!(h.sink.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let h = harness();
    let mut request = notification(SECRET, &prefixed("C1"), "C1", r#"{"a":1}"#);
    *request.body_mut() = Body::from(r#"{"a":2}"#);

    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_non_object_body_is_bad_request() {
    let h = harness();
    let (status, _) = send(&h.router, notification(SECRET, &prefixed("C1"), "C1", "[1,2]")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.sink.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_replaced_secret_applies_to_next_request() {
    let h = harness();
    let mut next = config();
    next.signature = signature("rotated");
    h.holder.replace(next).unwrap();

    let (status, _) = send(&h.router, notification(SECRET, &prefixed("C1"), "C1", "{}")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.router, notification("rotated", &prefixed("C1"), "C1", "{}")).await;
    assert_eq!(status, StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Remote-backed endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_config_reports_remote_url() {
    let h = harness();
    assert_eq!(
        send(&h.router, get("/config")).await,
        (StatusCode::OK, json!({ "remoteUrl": "https://remote.example" }))
    );

    let mut next = config();
    next.remote_url = Url::parse("https://moved.example/").unwrap();
    h.holder.replace(next).unwrap();
    let (_, body) = send(&h.router, get("/config")).await;
    assert_eq!(body, json!({ "remoteUrl": "https://moved.example" }));
}

#[tokio::test]
async fn test_graphql_requires_user() {
    let h = harness();
    let request = Request::post("/graphql").body(Body::from("{}")).unwrap();
    assert_eq!(send(&h.router, request).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_graphql_rejects_oversized_forwarded_header() {
    let h = harness();
    let request = Request::post("/graphql")
        .header(USER, "user-1")
        .header("x-application-authorization", "x".repeat(2000))
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("too long"));
}

/// Stand-in for the remote service's login endpoint. Every request must carry
/// a valid signature; the JSON bodies it received are returned.
async fn spawn_remote(status: StatusCode) -> (Url, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&received);
    let app = Router::new().route(
        "/mattermost",
        axum::routing::post(move |request: Request<Body>| {
            let recorder = Arc::clone(&recorder);
            async move {
                let (parts, body) = request.into_parts();
                let request = http::Request::from_parts(parts, to_bytes(body, 4096).await.unwrap());
                RequestVerifier::from_config(&signature(SECRET)).unwrap().verify(&request).unwrap();
                recorder.lock().push(serde_json::from_slice(request.body()).unwrap());
                (status, axum::Json(json!({ "userId": "remote-7" })))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (Url::parse(&format!("http://{addr}")).unwrap(), received)
}

fn login_router(remote_url: Url) -> Router {
    let config = BridgeConfig::builder()
        .remote_url(remote_url)
        .signature(signature(SECRET))
        .build()
        .unwrap();
    let state = AppState::builder()
        .config(ConfigHolder::new(config).unwrap())
        .store(Arc::new(MemoryBackend::new()))
        .directory(Arc::new(StaticDirectory::new().with_user("user-1", "ada@example.com")))
        .build()
        .unwrap();
    build_router(state)
}

fn login(user: &str, body: &'static str) -> Request<Body> {
    Request::post("/login").header(USER, user).body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn test_login_sends_signed_email_and_relays_answer() {
    let (remote_url, received) = spawn_remote(StatusCode::OK).await;
    let router = login_router(remote_url);

    let response = router.clone().oneshot(login("user-1", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "userId": "remote-7" }));

    assert_eq!(send(&router, login("user-1", r#"{"ignored":true}"#)).await.0, StatusCode::OK);
    assert_eq!(*received.lock(), vec![json!({ "email": "ada@example.com" }); 2]);
}

#[tokio::test]
async fn test_login_refusals() {
    let (remote_url, received) = spawn_remote(StatusCode::OK).await;
    let router = login_router(remote_url);

    let unauthenticated = Request::post("/login").body(Body::empty()).unwrap();
    assert_eq!(send(&router, unauthenticated).await.0, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&router, login("stranger", "")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "Not authorized" }));

    assert_eq!(send(&router, login("user-1", "{not json")).await.0, StatusCode::BAD_REQUEST);
    assert!(received.lock().is_empty());
}

#[tokio::test]
async fn test_login_remote_failure_is_bad_gateway() {
    let (remote_url, received) = spawn_remote(StatusCode::INTERNAL_SERVER_ERROR).await;
    let router = login_router(remote_url);

    let (status, body) = send(&router, login("user-1", "")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({ "error": "Remote service error" }));
    assert_eq!(received.lock().len(), 1);
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let response = h.router.clone().oneshot(Request::get("/health").body(Body::empty()).unwrap());
    let response = response.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
