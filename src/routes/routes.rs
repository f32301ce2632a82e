//! Defines routes for the upload gateway and the media catalog.
//!
//! ## Structure
//! - **Upload gateway**
//!   - `POST   /s3-multipart?action=...`: multipart protocol (admin only)
//!
//! - **Catalog**
//!   - `GET    /media`       : list records, newest first (`category`, `limit`)
//!   - `POST   /media`       : create a record (admin only)
//!   - `GET    /media/{id}`  : one record plus its resolved embed
//!   - `PUT    /media/{id}`  : replace a record's fields (admin only)
//!   - `DELETE /media/{id}`  : delete a record (admin only)
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`

use crate::{
    auth::AdminToken,
    handlers::{
        catalog_handlers::{create_media, delete_media, get_media, list_media, update_media},
        gateway_handlers::s3_multipart,
        health_handlers::{healthz, readyz},
    },
    services::{catalog::CatalogStore, gateway::GatewayService},
};
use axum::{
    Router,
    http::{HeaderName, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: GatewayService,
    pub catalog: Arc<dyn CatalogStore>,
    pub admin: AdminToken,
}

/// Browsers call the gateway and the catalog from any origin.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
}

/// Build the router; the caller supplies the state with `.with_state()`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/s3-multipart", post(s3_multipart))
        .route("/media", get(list_media).post(create_media))
        .route(
            "/media/{id}",
            get(get_media).put(update_media).delete(delete_media),
        )
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}
