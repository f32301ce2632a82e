//! Client side of the gateway protocol.
//!
//! `GatewayApi` is what the upload manager talks to. `GatewayClient` speaks
//! the HTTP endpoint; `GatewayService` itself also implements the trait so a
//! process that owns the credentials can drive uploads in-process.

use super::error::{UploadError, UploadResult};
use crate::{
    models::multipart::{
        AbortUploadResponse, CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest,
        CreateUploadResponse, GatewayAction, ListPartsResponse, PartETag, SignPartRequest,
        SignPartResponse, StoredPart, UploadHandle, UploadRefRequest,
    },
    services::gateway::{GatewayError, GatewayService},
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn create_upload(&self, file_name: &str, content_type: &str) -> UploadResult<UploadHandle>;
    async fn list_parts(&self, handle: &UploadHandle) -> UploadResult<Vec<StoredPart>>;
    async fn sign_part(&self, handle: &UploadHandle, part_number: i32) -> UploadResult<String>;
    async fn complete_upload(
        &self,
        handle: &UploadHandle,
        parts: Vec<PartETag>,
    ) -> UploadResult<String>;
    async fn abort_upload(&self, handle: &UploadHandle) -> UploadResult<()>;
}

fn upload_ref(handle: &UploadHandle) -> UploadRefRequest {
    UploadRefRequest {
        key: Some(handle.key.clone()),
        upload_id: Some(handle.upload_id.clone()),
    }
}

impl From<GatewayError> for UploadError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(message) => UploadError::Validation(message),
            GatewayError::Upstream { status, message } => UploadError::Upstream { status, message },
            GatewayError::Completion(message) => UploadError::Completion(message),
        }
    }
}

#[async_trait]
impl GatewayApi for GatewayService {
    async fn create_upload(&self, file_name: &str, content_type: &str) -> UploadResult<UploadHandle> {
        let created = self
            .begin_upload(CreateUploadRequest {
                filename: Some(file_name.to_string()),
                content_type: Some(content_type.to_string()),
            })
            .await?;
        Ok(created.into())
    }

    async fn list_parts(&self, handle: &UploadHandle) -> UploadResult<Vec<StoredPart>> {
        Ok(GatewayService::list_parts(self, upload_ref(handle)).await?.parts)
    }

    async fn sign_part(&self, handle: &UploadHandle, part_number: i32) -> UploadResult<String> {
        let signed = GatewayService::sign_part(
            self,
            SignPartRequest {
                key: Some(handle.key.clone()),
                upload_id: Some(handle.upload_id.clone()),
                part_number: Some(part_number),
            },
        )
        .await?;
        Ok(signed.url)
    }

    async fn complete_upload(
        &self,
        handle: &UploadHandle,
        parts: Vec<PartETag>,
    ) -> UploadResult<String> {
        let done = GatewayService::complete_upload(
            self,
            CompleteUploadRequest {
                key: Some(handle.key.clone()),
                upload_id: Some(handle.upload_id.clone()),
                parts: Some(parts),
            },
        )
        .await?;
        Ok(done.location)
    }

    async fn abort_upload(&self, handle: &UploadHandle) -> UploadResult<()> {
        GatewayService::abort_upload(self, upload_ref(handle)).await?;
        Ok(())
    }
}

/// Error envelope returned by the gateway endpoint.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

/// HTTP client for the gateway's single `?action=` endpoint.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GatewayClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    async fn call<B, T>(&self, action: GatewayAction, body: &B) -> UploadResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        debug!(%action, endpoint = %self.endpoint, "gateway call");
        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("action", action.as_str())])
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| UploadError::Upstream {
                status: None,
                message: format!("{} request failed: {}", action, e),
            })?;

        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(|e| UploadError::Upstream {
                status: Some(status.as_u16()),
                message: format!("invalid {} response: {}", action, e),
            });
        }

        let text = resp.text().await.unwrap_or_default();
        Err(error_from_response(status, &text))
    }
}

fn error_from_response(status: StatusCode, text: &str) -> UploadError {
    let (message, kind) = match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => (body.error, body.kind),
        Err(_) => (text.to_string(), None),
    };

    match (kind.as_deref(), status) {
        (Some("CompletionError"), _) | (None, StatusCode::CONFLICT) => UploadError::Completion(message),
        (Some("ValidationError"), _) | (None, StatusCode::BAD_REQUEST) => {
            UploadError::Validation(message)
        }
        _ => UploadError::Upstream {
            status: Some(status.as_u16()),
            message,
        },
    }
}

#[async_trait]
impl GatewayApi for GatewayClient {
    async fn create_upload(&self, file_name: &str, content_type: &str) -> UploadResult<UploadHandle> {
        let created: CreateUploadResponse = self
            .call(
                GatewayAction::CreateMultipartUpload,
                &CreateUploadRequest {
                    filename: Some(file_name.to_string()),
                    content_type: Some(content_type.to_string()),
                },
            )
            .await?;
        Ok(created.into())
    }

    async fn list_parts(&self, handle: &UploadHandle) -> UploadResult<Vec<StoredPart>> {
        let listed: ListPartsResponse = self
            .call(GatewayAction::ListParts, &upload_ref(handle))
            .await?;
        Ok(listed.parts)
    }

    async fn sign_part(&self, handle: &UploadHandle, part_number: i32) -> UploadResult<String> {
        let signed: SignPartResponse = self
            .call(
                GatewayAction::SignPart,
                &SignPartRequest {
                    key: Some(handle.key.clone()),
                    upload_id: Some(handle.upload_id.clone()),
                    part_number: Some(part_number),
                },
            )
            .await?;
        Ok(signed.url)
    }

    async fn complete_upload(
        &self,
        handle: &UploadHandle,
        parts: Vec<PartETag>,
    ) -> UploadResult<String> {
        let done: CompleteUploadResponse = self
            .call(
                GatewayAction::CompleteMultipartUpload,
                &CompleteUploadRequest {
                    key: Some(handle.key.clone()),
                    upload_id: Some(handle.upload_id.clone()),
                    parts: Some(parts),
                },
            )
            .await?;
        Ok(done.location)
    }

    async fn abort_upload(&self, handle: &UploadHandle) -> UploadResult<()> {
        let _: AbortUploadResponse = self
            .call(GatewayAction::AbortMultipartUpload, &upload_ref(handle))
            .await?;
        Ok(())
    }
}
