mod support;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use support::{TestApp, START};

#[tokio::test]
async fn health_check() {
    let app = TestApp::new();
    let (status, _) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn publish_then_page_through_following_feed() {
    let mut app = TestApp::new();
    let author = Uuid::new_v4();
    let follower = Uuid::new_v4();
    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();

    let (status, body) = app
        .post(
            "/api/v1/feed/publish",
            json!({ "post_id": p1, "author_id": author, "follower_ids": [follower] }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["score"], START);

    app.clock.set(START + 1);
    let (status, _) = app
        .post(
            "/api/v1/feed/publish",
            json!({ "post_id": p2, "author_id": author, "follower_ids": [follower] }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    app.drain_fanout().await;

    let (status, first) = app
        .get(&format!("/api/v1/feed?scope=following&user_id={follower}&limit=1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["items"], json!([p2]));
    assert_eq!(first["has_next"], true);
    let cursor = first["next_cursor"].as_str().expect("cursor").to_string();

    let (_, second) = app
        .get(&format!(
            "/api/v1/feed?scope=following&user_id={follower}&limit=1&cursor={cursor}"
        ))
        .await;
    assert_eq!(second["items"], json!([p1]));
    assert_eq!(second["has_next"], false);
    assert!(second["next_cursor"].is_null());

    let (_, global) = app.get("/api/v1/feed?limit=10").await;
    assert_eq!(global["count"], 2);
}

#[tokio::test]
async fn following_feed_requires_user() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/v1/feed?scope=following").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn garbage_cursor_reads_from_latest() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/v1/feed?cursor=%21%21nope").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["has_next"], false);
}

#[tokio::test]
async fn unavailable_store_serves_empty_feed() {
    let app = TestApp::new();
    app.timelines.set_available(false);
    let (status, body) = app.get("/api/v1/feed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"], json!([]));
    assert_eq!(body["has_next"], false);
}
