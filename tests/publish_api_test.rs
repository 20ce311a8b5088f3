//! Integration tests for the HTTP publish surface
//!
//! Drives the axum router directly with stubbed platform adapters: the
//! submission returns a job id synchronously, the job is polled to a
//! terminal state, and rejections surface as 400s without creating jobs.

mod common;

use std::collections::HashMap;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::stub_app;
use crosspost::models::Platform;
use crosspost::platforms::{PublishKind, PublishOutcome, PublishedPost};
use crosspost::server::create_router;
use serde_json::{json, Value};
use tower::ServiceExt;

fn success_outcome() -> PublishOutcome {
    PublishOutcome::success(PublishedPost {
        post_id: "remote-1".to_string(),
        kind: PublishKind::Photo,
        item_count: 1,
        warning: None,
    })
}

async fn post_json(router: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(router: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn publish_body(platforms: &[&str]) -> Value {
    json!({
        "user_id": "u1",
        "caption": "hello from the api",
        "hashtags": ["rust"],
        "media": [{"type": "image", "url": "https://cdn.example.com/a.jpg"}],
        "platforms": platforms,
    })
}

#[tokio::test]
async fn test_publish_returns_job_id_synchronously() {
    let mut outcomes = HashMap::new();
    outcomes.insert(Platform::Facebook, success_outcome());
    let app = stub_app(outcomes).await;
    let router = create_router(app.state);

    let (status, body) = post_json(&router, "/api/publish", publish_body(&["facebook"])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "processing");
    assert!(body["data"]["job_id"].as_str().is_some());
}

#[tokio::test]
async fn test_publish_then_poll_to_completion() {
    let mut outcomes = HashMap::new();
    outcomes.insert(Platform::Facebook, success_outcome());
    outcomes.insert(Platform::Instagram, PublishOutcome::error("container expired"));
    let app = stub_app(outcomes).await;
    let router = create_router(app.state);

    let (_, body) = post_json(
        &router,
        "/api/publish",
        publish_body(&["facebook", "instagram"]),
    )
    .await;
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    // Poll until terminal
    let mut terminal = Value::Null;
    for _ in 0..200 {
        let (status, body) = get(&router, &format!("/api/jobs/{job_id}")).await;
        assert_eq!(status, StatusCode::OK);

        let job_status = body["data"]["status"].as_str().unwrap().to_string();
        if job_status == "completed" || job_status == "failed" {
            terminal = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(terminal["data"]["status"], "completed");
    assert_eq!(terminal["data"]["progress"], 100);
    assert_eq!(terminal["data"]["result"]["status"], "partial");
    assert_eq!(
        terminal["data"]["result"]["failed_platforms"],
        json!(["instagram"])
    );

    // Terminal payload is idempotent across polls
    let (_, again) = get(&router, &format!("/api/jobs/{job_id}")).await;
    assert_eq!(again["data"]["status"], terminal["data"]["status"]);
    assert_eq!(again["data"]["progress"], terminal["data"]["progress"]);
    assert_eq!(again["data"]["result"], terminal["data"]["result"]);
    assert_eq!(again["data"]["updated_at"], terminal["data"]["updated_at"]);
}

#[tokio::test]
async fn test_unknown_platform_rejected_with_400() {
    let app = stub_app(HashMap::new()).await;
    let router = create_router(app.state);

    let (status, body) = post_json(&router, "/api/publish", publish_body(&["myspace"])).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("myspace"));
}

#[tokio::test]
async fn test_instagram_without_media_rejected_with_400() {
    let app = stub_app(HashMap::new()).await;
    let router = create_router(app.state);

    let body = json!({
        "user_id": "u1",
        "caption": "no media here",
        "platforms": ["instagram"],
    });
    let (status, response) = post_json(&router, "/api/publish", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"]
        .as_str()
        .unwrap()
        .contains("at least one media item"));
}

#[tokio::test]
async fn test_unknown_job_returns_404() {
    let app = stub_app(HashMap::new()).await;
    let router = create_router(app.state);

    let (status, body) = get(&router, "/api/jobs/no-such-job").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = stub_app(HashMap::new()).await;
    let router = create_router(app.state);

    let (status, body) = get(&router, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_platforms_endpoint_lists_supported() {
    let app = stub_app(HashMap::new()).await;
    let router = create_router(app.state);

    let (status, body) = get(&router, "/api/platforms").await;

    assert_eq!(status, StatusCode::OK);
    let platforms = body["data"]["platforms"].as_array().unwrap();
    assert_eq!(platforms.len(), 4);
    assert!(platforms.contains(&json!("facebook")));
    assert!(platforms.contains(&json!("linkedin-company")));
}
