use anyhow::{anyhow, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use voice_session::{
    create_router, AlwaysGranted, AppState, LoopbackRecognizer, LoopbackRecognizerFactory,
    PermissionGate, Recognizer, RecognizerEvent, RecognizerFactory, SessionConfig,
    StaticPermission,
};

fn router(factory: Arc<dyn RecognizerFactory>, permissions: Arc<dyn PermissionGate>) -> Router {
    create_router(AppState::new(factory, permissions, SessionConfig::default()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let app = router(Arc::new(LoopbackRecognizerFactory::new()), Arc::new(AlwaysGranted));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_session_lifecycle() {
    let factory = Arc::new(LoopbackRecognizerFactory::new());
    let app = router(factory.clone(), Arc::new(AlwaysGranted));

    let (status, body) = send(&app, "POST", "/sessions/start", Some(r#"{"session_id": "s1"}"#)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["session_id"], "s1");
    assert_eq!(body["state"], "starting");

    let recognizer = factory.get("s1").unwrap();
    assert_eq!(recognizer.start_count(), 1);

    let (status, _) = send(&app, "POST", "/sessions/start", Some(r#"{"session_id": "s1"}"#)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit_final("hello there");
    tokio::time::sleep(Duration::from_millis(1)).await;

    let (status, body) = send(&app, "GET", "/sessions/s1/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["snapshot"]["state"], "listening");
    assert_eq!(body["snapshot"]["is_recording"], true);
    assert_eq!(body["stats"]["utterance_count"], 1);

    let (status, body) = send(&app, "GET", "/sessions/s1/transcript", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"], "hello there");

    let (status, body) = send(&app, "POST", "/sessions/s1/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(recognizer.stop_count(), 1);

    let (status, body) = send(&app, "POST", "/sessions/s1/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"], "");

    let (status, _) = send(&app, "DELETE", "/sessions/s1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!recognizer.has_subscriber());

    let (status, _) = send(&app, "GET", "/sessions/s1/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_without_body_generates_id() {
    let app = router(Arc::new(LoopbackRecognizerFactory::new()), Arc::new(AlwaysGranted));

    let (status, body) = send(&app, "POST", "/sessions/start", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["session_id"].as_str().unwrap().starts_with("session-"));
}

#[tokio::test]
async fn test_continuous_overrides() {
    let app = router(Arc::new(LoopbackRecognizerFactory::new()), Arc::new(AlwaysGranted));

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/start",
        Some(r#"{"session_id": "c1", "continuous": true, "max_silence_ms": 2000}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mode"], "continuous");
    assert_eq!(body["continue_listening"], true);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = router(Arc::new(LoopbackRecognizerFactory::new()), Arc::new(AlwaysGranted));

    for (method, uri) in [
        ("POST", "/sessions/nope/start"),
        ("POST", "/sessions/nope/stop"),
        ("POST", "/sessions/nope/cancel"),
        ("POST", "/sessions/nope/reset"),
        ("GET", "/sessions/nope/status"),
        ("GET", "/sessions/nope/transcript"),
        ("DELETE", "/sessions/nope"),
    ] {
        let (status, _) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_permission_denied_is_403() {
    let app = router(
        Arc::new(LoopbackRecognizerFactory::new()),
        Arc::new(StaticPermission::denied()),
    );

    let (status, body) = send(&app, "POST", "/sessions/start", Some(r#"{"session_id": "p1"}"#)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Microphone permission denied");

    // Failed sessions are not kept
    let (status, _) = send(&app, "GET", "/sessions/p1/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Factory whose recognizers reject their first start
struct RejectingFactory;

#[async_trait::async_trait]
impl RecognizerFactory for RejectingFactory {
    async fn create(&self, _session_id: &str) -> Result<Arc<dyn Recognizer>> {
        let recognizer = LoopbackRecognizer::new();
        recognizer.fail_next_start("engine offline");
        Ok(Arc::new(recognizer))
    }
}

/// Factory that cannot reach its backend
struct UnreachableFactory;

#[async_trait::async_trait]
impl RecognizerFactory for UnreachableFactory {
    async fn create(&self, _session_id: &str) -> Result<Arc<dyn Recognizer>> {
        Err(anyhow!("connection refused"))
    }
}

#[tokio::test]
async fn test_recognizer_failures_are_502() {
    let app = router(Arc::new(RejectingFactory), Arc::new(AlwaysGranted));
    let (status, body) = send(&app, "POST", "/sessions/start", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to start recording: engine offline");

    let app = router(Arc::new(UnreachableFactory), Arc::new(AlwaysGranted));
    let (status, _) = send(&app, "POST", "/sessions/start", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
