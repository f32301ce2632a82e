use crate::services::{catalog::CatalogError, gateway::GatewayError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// HTTP error envelope: `{"error", "status", "kind"}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Machine-readable error class, e.g. `CompletionError`.
    pub kind: Option<&'static str>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg).with_kind("NotFound")
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg).with_kind("ValidationError")
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg).with_kind("Unauthorized")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self.kind {
            Some(kind) => json!({
                "error": self.message,
                "status": self.status.as_u16(),
                "kind": kind,
            }),
            None => json!({
                "error": self.message,
                "status": self.status.as_u16()
            }),
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(message) => AppError::bad_request(message),
            GatewayError::Completion(message) => {
                AppError::new(StatusCode::CONFLICT, message).with_kind("CompletionError")
            }
            err @ GatewayError::Upstream { .. } => {
                error!(error = %err, "object store call failed");
                AppError::new(StatusCode::BAD_GATEWAY, err.to_string()).with_kind("UpstreamError")
            }
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(message) => AppError::bad_request(message),
            CatalogError::NotFound(id) => AppError::not_found(format!("media `{}` not found", id)),
            CatalogError::Sqlx(e) => {
                error!(error = %e, "catalog query failed");
                AppError::internal(e.to_string()).with_kind("StorageError")
            }
        }
    }
}
