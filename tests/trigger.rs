mod common;

use std::sync::Arc;
use std::time::Duration;

use agentic_solver::server::{router, ServeState};
use agentic_solver::ExecutionResult;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::*;

struct Harness {
    router: Router,
    renderer: Arc<ScriptedRenderer>,
    model: Arc<ScriptedModel>,
}

fn harness() -> Harness {
    let config = config(5);
    // A failing renderer ends each background run right after it starts.
    let renderer = Arc::new(ScriptedRenderer::failing());
    let model = Arc::new(ScriptedModel::new("{}"));
    let runner = Arc::new(CannedRunner::new(ExecutionResult::completed("", true)));
    let agent = Arc::new(agent(config.clone(), renderer.clone(), model.clone(), runner));
    Harness {
        router: router(ServeState::new(config, agent)),
        renderer,
        model,
    }
}

fn start_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn wrong_secret_is_rejected_before_any_work() {
    let h = harness();

    for (email, url) in [
        (EMAIL, "https://quiz.example/start"),
        ("someone@else.test", "https://quiz.example/other"),
        ("", "not even a url"),
    ] {
        let response = h
            .router
            .clone()
            .oneshot(start_request(json!({"email": email, "secret": "wrong", "url": url})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["detail"], "Invalid secret");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.renderer.visited().is_empty());
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn valid_request_is_acknowledged_and_launched() {
    let h = harness();

    let response = h
        .router
        .clone()
        .oneshot(start_request(json!({
            "email": EMAIL,
            "secret": SECRET,
            "url": "https://quiz.example/start"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"message": "Agent activated", "status": "ok"})
    );

    tokio::time::timeout(Duration::from_secs(5), h.renderer.notify.notified())
        .await
        .expect("agent loop never started");
    assert_eq!(h.renderer.visited(), vec!["https://quiz.example/start".to_string()]);
}

#[tokio::test]
async fn invalid_start_url_is_a_bad_request() {
    let h = harness();

    let response = h
        .router
        .clone()
        .oneshot(start_request(json!({
            "email": EMAIL,
            "secret": SECRET,
            "url": "javascript:alert(1)"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.renderer.visited().is_empty());
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let h = harness();

    let response = h
        .router
        .clone()
        .oneshot(start_request(json!({"email": EMAIL, "url": "https://quiz.example/"})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(h.renderer.visited().is_empty());
}
