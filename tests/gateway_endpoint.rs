mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use bytes::Bytes;
use common::{TOKEN, gateway_call, send, test_app};
use media_catalog::uploader::PartTransport;
use serde_json::json;
use tower::util::ServiceExt;

#[tokio::test]
async fn unknown_or_missing_action_is_a_bad_request() {
    let app = test_app().await;

    let (status, body) = gateway_call(&app.router, "deleteBucket", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Unknown action"));

    let (status, _) = send(
        &app.router,
        Method::POST,
        "/s3-multipart",
        Some(TOKEN),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gateway_requires_the_admin_token() {
    let app = test_app().await;
    let uri = "/s3-multipart?action=createMultipartUpload";
    let body = json!({"filename": "a.mp4", "contentType": "video/mp4"});

    let (status, _) = send(&app.router, Method::POST, uri, None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app.router, Method::POST, uri, Some("guess"), Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.pending_uploads(), 0);
}

#[tokio::test]
async fn empty_body_reports_missing_fields() {
    let app = test_app().await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/s3-multipart?action=createMultipartUpload")
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .body(Body::empty())
        .unwrap();

    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["kind"], "ValidationError");
    assert!(body["error"].as_str().unwrap().contains("filename"));
}

#[tokio::test]
async fn full_protocol_over_http() {
    let app = test_app().await;

    let (status, created) = gateway_call(
        &app.router,
        "createMultipartUpload",
        json!({"filename": "trailer.mp4", "contentType": "video/mp4"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let key = created["key"].as_str().unwrap().to_string();
    let upload_id = created["uploadId"].as_str().unwrap().to_string();
    assert!(key.starts_with("uploads/") && key.ends_with("-trailer.mp4"));

    let mut parts = Vec::new();
    for (number, chunk) in [(1, "hello "), (2, "world")] {
        let (status, signed) = gateway_call(
            &app.router,
            "signPart",
            json!({"key": key, "uploadId": upload_id, "partNumber": number}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let etag = app
            .store
            .put_part(signed["url"].as_str().unwrap(), Bytes::from(chunk))
            .await
            .unwrap();
        parts.push(json!({"PartNumber": number, "ETag": etag}));
    }

    let (status, listed) = gateway_call(
        &app.router,
        "listParts",
        json!({"key": key, "uploadId": upload_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["parts"].as_array().unwrap().len(), 2);
    assert_eq!(listed["parts"][0]["PartNumber"], 1);
    assert_eq!(listed["parts"][1]["Size"], 5);

    // submitted out of order; the gateway sorts before completing
    parts.reverse();
    let (status, done) = gateway_call(
        &app.router,
        "completeMultipartUpload",
        json!({"key": key, "uploadId": upload_id, "parts": parts}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["location"], format!("memory://media/{}", key));

    let object = app.store.object(&key).unwrap();
    assert_eq!(object.data, Bytes::from("hello world"));
    assert_eq!(object.content_type, "video/mp4");
}

#[tokio::test]
async fn abort_twice_succeeds_both_times() {
    let app = test_app().await;
    let (_, created) = gateway_call(
        &app.router,
        "createMultipartUpload",
        json!({"filename": "a.mp4", "contentType": "video/mp4"}),
    )
    .await;
    let handle = json!({"key": created["key"], "uploadId": created["uploadId"]});

    for _ in 0..2 {
        let (status, body) = gateway_call(&app.router, "abortMultipartUpload", handle.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
    }
    assert_eq!(app.store.pending_uploads(), 0);
}

#[tokio::test]
async fn etag_mismatch_is_a_conflict() {
    let app = test_app().await;
    let (_, created) = gateway_call(
        &app.router,
        "createMultipartUpload",
        json!({"filename": "a.mp4", "contentType": "video/mp4"}),
    )
    .await;
    let (_, signed) = gateway_call(
        &app.router,
        "signPart",
        json!({"key": created["key"], "uploadId": created["uploadId"], "partNumber": 1}),
    )
    .await;
    app.store
        .put_part(signed["url"].as_str().unwrap(), Bytes::from_static(b"data"))
        .await
        .unwrap();

    let (status, body) = gateway_call(
        &app.router,
        "completeMultipartUpload",
        json!({
            "key": created["key"],
            "uploadId": created["uploadId"],
            "parts": [{"PartNumber": 1, "ETag": "\"not-the-etag\""}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "CompletionError");
    assert_eq!(app.store.pending_uploads(), 1);
}

#[tokio::test]
async fn gaps_in_part_numbers_are_rejected_before_the_store() {
    let app = test_app().await;
    let (_, created) = gateway_call(
        &app.router,
        "createMultipartUpload",
        json!({"filename": "a.mp4", "contentType": "video/mp4"}),
    )
    .await;

    let (status, body) = gateway_call(
        &app.router,
        "completeMultipartUpload",
        json!({
            "key": created["key"],
            "uploadId": created["uploadId"],
            "parts": [{"PartNumber": 1, "ETag": "\"a\""}, {"PartNumber": 3, "ETag": "\"c\""}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "ValidationError");
}

#[tokio::test]
async fn list_parts_of_unknown_upload_is_an_upstream_error() {
    let app = test_app().await;
    let (status, body) = gateway_call(
        &app.router,
        "listParts",
        json!({"key": "uploads/x-a.mp4", "uploadId": "missing"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "UpstreamError");
}

#[tokio::test]
async fn cors_preflight_allows_any_origin() {
    let app = test_app().await;
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/s3-multipart?action=signPart")
        .header(header::ORIGIN, "https://catalog.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,content-type")
        .body(Body::empty())
        .unwrap();

    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}
