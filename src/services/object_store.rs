//! Object store adapter used by the upload gateway.
//!
//! `ObjectStore` is the narrow set of privileged multipart calls the gateway
//! needs. `S3ObjectStore` forwards them to an S3-compatible bucket through
//! `aws-sdk-s3`; credentials never leave this module.

use crate::{
    config::S3Settings,
    models::multipart::{PartETag, StoredPart},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    types::{CompletedMultipartUpload, CompletedPart},
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload `{0}` does not exist")]
    NoSuchUpload(String),
    #[error("parts rejected by the object store: {0}")]
    InvalidParts(String),
    #[error("{operation} failed{}: {message}", status_suffix(.status))]
    Upstream {
        operation: &'static str,
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
}

impl StoreError {
    pub fn upstream(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            operation,
            status: None,
            code: None,
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" with status {}", s))
        .unwrap_or_default()
}

/// Privileged multipart operations against one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a multipart upload for `key`; returns the store's upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> StoreResult<String>;

    /// Every part recorded so far, ordered by part number.
    async fn list_parts(&self, key: &str, upload_id: &str) -> StoreResult<Vec<StoredPart>>;

    /// A URL that allows a single `UploadPart` for `part_number` until `expires_in` elapses.
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StoreResult<String>;

    /// Finalize the upload. `parts` must already be sorted by part number.
    /// Returns the store-reported location, if any.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> StoreResult<Option<String>>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StoreResult<()>;

    /// Cheap reachability probe used by `/readyz`.
    async fn ping(&self) -> StoreResult<()>;
}

/// `ObjectStore` backed by an S3-compatible service.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3ObjectStore {
    /// Build a client from the settings; explicit keys win over the default
    /// credential chain.
    pub async fn new(settings: &S3Settings) -> anyhow::Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.region.clone()));

        if let Some(endpoint) = settings.endpoint_url.as_deref() {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(ak), Some(sk)) = (&settings.access_key_id, &settings.secret_access_key) {
            let creds = aws_sdk_s3::config::Credentials::new(ak, sk, None, None, "media-catalog");
            loader = loader.credentials_provider(creds);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        info!(
            bucket = %settings.bucket,
            region = %settings.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Translate an SDK failure, keeping the HTTP status and the store's error code.
fn sdk_error<E>(operation: &'static str, err: SdkError<E, HttpResponse>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let service = err.as_service_error();
    let code = service.and_then(|e| e.code()).map(str::to_string);
    let message = service
        .and_then(|e| e.message())
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    StoreError::Upstream {
        operation,
        status,
        code,
        message,
    }
}

fn has_code(err: &StoreError, wanted: &[&str]) -> bool {
    matches!(err, StoreError::Upstream { code: Some(code), .. } if wanted.contains(&code.as_str()))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> StoreResult<String> {
        debug!(bucket = %self.bucket, key, "create_multipart_upload");
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| sdk_error("create_multipart_upload", e))?;

        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::upstream("create_multipart_upload", "no upload id in response"))
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> StoreResult<Vec<StoredPart>> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_parts()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .set_part_number_marker(marker.clone())
                .send()
                .await
                .map_err(|e| sdk_error("list_parts", e))
                .map_err(|e| {
                    if has_code(&e, &["NoSuchUpload"]) {
                        StoreError::NoSuchUpload(upload_id.to_string())
                    } else {
                        e
                    }
                })?;

            parts.extend(resp.parts().iter().filter_map(|p| {
                Some(StoredPart {
                    part_number: p.part_number()?,
                    size: p.size().unwrap_or_default(),
                    e_tag: p.e_tag()?.to_string(),
                })
            }));

            match (resp.is_truncated(), resp.next_part_number_marker()) {
                (Some(true), Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        parts.sort_by_key(|p| p.part_number);
        debug!(key, upload_id, count = parts.len(), "list_parts");
        Ok(parts)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StoreResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StoreError::upstream("presign_upload_part", e.to_string()))?;

        let presigned = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(presigning)
            .await
            .map_err(|e| sdk_error("presign_upload_part", e))?;

        Ok(presigned.uri().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> StoreResult<Option<String>> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(
                parts
                    .iter()
                    .map(|p| {
                        CompletedPart::builder()
                            .part_number(p.part_number)
                            .e_tag(&p.e_tag)
                            .build()
                    })
                    .collect(),
            ))
            .build();

        let resp = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| sdk_error("complete_multipart_upload", e))
            .map_err(|e| {
                if has_code(&e, &["NoSuchUpload"]) {
                    StoreError::NoSuchUpload(upload_id.to_string())
                } else if has_code(&e, &["InvalidPart", "InvalidPartOrder", "EntityTooSmall"]) {
                    StoreError::InvalidParts(e.to_string())
                } else {
                    e
                }
            })?;

        Ok(resp.location().map(str::to_string))
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_error("abort_multipart_upload", e))
            .map_err(|e| {
                if has_code(&e, &["NoSuchUpload"]) {
                    StoreError::NoSuchUpload(upload_id.to_string())
                } else {
                    e
                }
            })?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| sdk_error("head_bucket", e))?;
        Ok(())
    }
}
