#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use media_catalog::{
    auth::AdminToken,
    routes::routes::AppState,
    services::{
        catalog::SqliteCatalogStore,
        gateway::{GatewayConfig, GatewayService},
        memory_store::MemoryObjectStore,
    },
};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryObjectStore>,
    pub catalog: Arc<SqliteCatalogStore>,
    pub gateway: GatewayService,
}

pub async fn catalog() -> Arc<SqliteCatalogStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let catalog = SqliteCatalogStore::new(Arc::new(pool));
    catalog.migrate().await.unwrap();
    Arc::new(catalog)
}

pub async fn test_app() -> TestApp {
    let store = Arc::new(MemoryObjectStore::new("media"));
    let gateway = GatewayService::new(store.clone(), GatewayConfig::default());
    let catalog = catalog().await;

    let router = media_catalog::app(AppState {
        gateway: gateway.clone(),
        catalog: catalog.clone(),
        admin: AdminToken::new(TOKEN),
    });

    TestApp {
        router,
        store,
        catalog,
        gateway,
    }
}

/// Send one request through the router and decode the JSON response body.
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn gateway_call(router: &Router, action: &str, body: Value) -> (StatusCode, Value) {
    send(
        router,
        Method::POST,
        &format!("/s3-multipart?action={}", action),
        Some(TOKEN),
        Some(body),
    )
    .await
}
