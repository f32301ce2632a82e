//! Media catalog with a resumable S3 multipart upload gateway.
//!
//! The server side (`services`, `handlers`, `routes`) holds the object store
//! credentials and the catalog database. The client side (`uploader`,
//! `publish`) moves file bytes straight to the object store over signed URLs.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod publish;
pub mod routes;
pub mod services;
pub mod uploader;

use axum::Router;
use routes::routes::AppState;

/// The full HTTP application with its state attached.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
