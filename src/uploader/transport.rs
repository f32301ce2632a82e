//! Direct part transfers to the object store over signed URLs.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header};
use thiserror::Error;
use tracing::debug;

use super::error::UploadError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The signed URL is no longer valid; a fresh signature fixes it.
    #[error("signed URL expired: {0}")]
    Expired(String),
    /// Network trouble or a server-side hiccup.
    #[error("transfer interrupted: {0}")]
    Transient(String),
    #[error("object store rejected the part ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl TransferError {
    pub fn into_upload_error(self, part_number: i32) -> UploadError {
        match self {
            TransferError::Expired(_) => UploadError::ExpiredUrl { part_number },
            TransferError::Transient(message) => UploadError::Upstream {
                status: None,
                message,
            },
            TransferError::Rejected { status, message } => UploadError::Upstream {
                status: Some(status),
                message,
            },
        }
    }
}

/// Uploads one part's bytes to a signed URL and returns the store's eTag verbatim.
#[async_trait]
pub trait PartTransport: Send + Sync {
    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, TransferError>;
}

/// `PartTransport` that issues `PUT` requests with `reqwest`.
#[derive(Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PartTransport for HttpTransport {
    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, TransferError> {
        let len = body.len();
        let resp = self
            .http
            .put(url)
            .body(body)
            .send()
            .await
            .map_err(|e| TransferError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let etag = resp
                .headers()
                .get(header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| TransferError::Rejected {
                    status: status.as_u16(),
                    message: "response carried no ETag header (check the bucket's CORS ExposeHeaders)"
                        .into(),
                })?;
            debug!(bytes = len, etag = %etag, "part stored");
            return Ok(etag);
        }

        let text = resp.text().await.unwrap_or_default();
        Err(classify_failure(status, text))
    }
}

/// S3 answers an expired presigned request with `403 AccessDenied` and
/// "Request has expired" in the body.
fn classify_failure(status: StatusCode, body: String) -> TransferError {
    if status == StatusCode::FORBIDDEN
        && (body.contains("Request has expired") || body.contains("ExpiredToken"))
    {
        return TransferError::Expired(body);
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return TransferError::Transient(format!("{}: {}", status, body));
    }
    TransferError::Rejected {
        status: status.as_u16(),
        message: body,
    }
}
