mod common;

use axum::http::{Method, StatusCode};
use common::{TOKEN, send, test_app};
use serde_json::json;

#[tokio::test]
async fn writes_need_the_admin_token_and_reads_do_not() {
    let app = test_app().await;
    let body = json!({"title": "Trailer", "mediaUrl": "https://youtu.be/abc123"});

    let (status, _) = send(&app.router, Method::POST, "/media", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = send(&app.router, Method::POST, "/media", Some(TOKEN), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["category"], "movie");
    assert_eq!(created["description"], serde_json::Value::Null);

    let (status, listed) = send(&app.router, Method::GET, "/media", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn detail_includes_the_resolved_embed() {
    let app = test_app().await;
    let (_, created) = send(
        &app.router,
        Method::POST,
        "/media",
        Some(TOKEN),
        Some(json!({"title": "Clip", "mediaUrl": "https://vimeo.com/76979871", "category": "clip"})),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, detail) = send(&app.router, Method::GET, &format!("/media/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "Clip");
    assert_eq!(detail["embed"]["type"], "iframe");
    assert_eq!(
        detail["embed"]["src"],
        "https://player.vimeo.com/video/76979871?autoplay=1&color=e53e3e"
    );
}

#[tokio::test]
async fn list_filters_by_category_newest_first() {
    let app = test_app().await;
    for (title, category) in [("a", "movie"), ("b", "series"), ("c", "series")] {
        let (status, _) = send(
            &app.router,
            Method::POST,
            "/media",
            Some(TOKEN),
            Some(json!({"title": title, "mediaUrl": "https://cdn.example.com/x.mp4", "category": category})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, listed) = send(&app.router, Method::GET, "/media?category=series", None, None).await;
    let titles: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["c", "b"]);
}

#[tokio::test]
async fn update_delete_and_missing_records() {
    let app = test_app().await;
    let (_, created) = send(
        &app.router,
        Method::POST,
        "/media",
        Some(TOKEN),
        Some(json!({"title": "Old", "mediaUrl": "https://cdn.example.com/old.mp4"})),
    )
    .await;
    let uri = format!("/media/{}", created["id"].as_str().unwrap());

    let (status, updated) = send(
        &app.router,
        Method::PUT,
        &uri,
        Some(TOKEN),
        Some(json!({"title": "New", "mediaUrl": "https://cdn.example.com/new.mp4", "coverUrl": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "New");
    assert_eq!(updated["coverUrl"], serde_json::Value::Null);

    let (status, _) = send(&app.router, Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app.router, Method::DELETE, &uri, Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app.router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NotFound");
}

#[tokio::test]
async fn invalid_records_are_rejected_verbatim() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/media",
        Some(TOKEN),
        Some(json!({"title": "  ", "mediaUrl": "https://cdn.example.com/x.mp4"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title is required");
}

#[tokio::test]
async fn malformed_bodies_are_checked_after_the_token() {
    let app = test_app().await;
    let malformed = json!({"title": 5, "mediaUrl": ["not", "a", "url"]});

    let (status, body) = send(&app.router, Method::POST, "/media", None, Some(malformed.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "Unauthorized");

    let (status, body) = send(&app.router, Method::POST, "/media", Some(TOKEN), Some(malformed.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));

    let uri = format!("/media/{}", uuid::Uuid::new_v4());
    let (status, _) = send(&app.router, Method::PUT, &uri, None, Some(malformed.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = send(&app.router, Method::PUT, &uri, Some(TOKEN), Some(malformed)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");

    let (status, body) = send(&app.router, Method::POST, "/media", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "title is required");
}

#[tokio::test]
async fn probes_report_ready() {
    let app = test_app().await;
    let (status, body) = send(&app.router, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app.router, Method::GET, "/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["sqlite"]["ok"], true);
    assert_eq!(body["checks"]["object_store"]["ok"], true);
}
