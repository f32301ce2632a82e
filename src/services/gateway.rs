//! GatewayService: the privileged half of the multipart upload protocol.
//!
//! The gateway validates requests, generates collision-free object keys and
//! forwards each operation as exactly one call to the object store. It keeps
//! no state between calls: everything it needs arrives in the request, and
//! the object store's own multipart bookkeeping is the source of truth.

use crate::{
    models::multipart::{
        AbortUploadResponse, CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest,
        CreateUploadResponse, ListPartsResponse, MAX_PART_NUMBER, PartETag, SignPartRequest,
        SignPartResponse, UploadRefRequest,
    },
    services::object_store::{ObjectStore, StoreError},
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("object store error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },
    #[error("upload completion rejected: {0}")]
    Completion(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidParts(message) => GatewayError::Completion(message),
            StoreError::Upstream {
                status, message, ..
            } => GatewayError::Upstream { status, message },
            StoreError::NoSuchUpload(id) => GatewayError::Upstream {
                status: Some(404),
                message: format!("NoSuchUpload: upload `{}` does not exist", id),
            },
        }
    }
}

/// Settings the gateway needs besides the store itself.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Every generated key starts with this prefix and callers may only
    /// address keys beneath it.
    pub key_prefix: String,
    /// Lifetime of signed part URLs.
    pub presign_ttl: Duration,
    /// Used to build the location when the store does not report one.
    pub public_base_url: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_prefix: "uploads/".into(),
            presign_ttl: Duration::from_secs(3600),
            public_base_url: None,
        }
    }
}

#[derive(Clone)]
pub struct GatewayService {
    store: Arc<dyn ObjectStore>,
    config: GatewayConfig,
}

impl GatewayService {
    pub fn new(store: Arc<dyn ObjectStore>, config: GatewayConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Open a multipart upload under a fresh, unique key.
    #[instrument(skip(self, req), fields(filename = ?req.filename))]
    pub async fn begin_upload(&self, req: CreateUploadRequest) -> GatewayResult<CreateUploadResponse> {
        let filename = required("filename", req.filename.as_deref())?;
        let content_type = required("contentType", req.content_type.as_deref())?;

        let key = format!(
            "{}{}-{}",
            self.config.key_prefix,
            Uuid::new_v4(),
            sanitize_file_name(filename)?
        );
        self.ensure_key_safe(&key)?;

        let upload_id = self.store.create_multipart_upload(&key, content_type).await?;
        info!(key = %key, upload_id = %upload_id, "multipart upload started");

        Ok(CreateUploadResponse { key, upload_id })
    }

    /// Report the parts the store already holds for an upload.
    #[instrument(skip(self, req), fields(key = ?req.key))]
    pub async fn list_parts(&self, req: UploadRefRequest) -> GatewayResult<ListPartsResponse> {
        let (key, upload_id) = self.upload_ref(req.key.as_deref(), req.upload_id.as_deref())?;
        let parts = self.store.list_parts(key, upload_id).await?;
        Ok(ListPartsResponse { parts })
    }

    /// Issue a time-limited URL for uploading exactly one part.
    #[instrument(skip(self, req), fields(key = ?req.key, part_number = ?req.part_number))]
    pub async fn sign_part(&self, req: SignPartRequest) -> GatewayResult<SignPartResponse> {
        let (key, upload_id) = self.upload_ref(req.key.as_deref(), req.upload_id.as_deref())?;
        let part_number = req
            .part_number
            .ok_or_else(|| GatewayError::Validation("partNumber is required".into()))?;
        ensure_part_number(part_number)?;

        let url = self
            .store
            .presign_upload_part(key, upload_id, part_number, self.config.presign_ttl)
            .await?;
        Ok(SignPartResponse { url })
    }

    /// Finalize an upload from its parts, sorted here by part number.
    #[instrument(skip(self, req), fields(key = ?req.key))]
    pub async fn complete_upload(
        &self,
        req: CompleteUploadRequest,
    ) -> GatewayResult<CompleteUploadResponse> {
        let (key, upload_id) = self.upload_ref(req.key.as_deref(), req.upload_id.as_deref())?;
        let parts = sorted_parts(req.parts.unwrap_or_default())?;

        let location = self
            .store
            .complete_multipart_upload(key, upload_id, &parts)
            .await
            .map_err(|err| match err {
                StoreError::InvalidParts(_) => {
                    warn!(key, upload_id, error = %err, "completion rejected by the store");
                    GatewayError::from(err)
                }
                other => GatewayError::from(other),
            })?;

        let location = match (location, self.config.public_base_url.as_deref()) {
            (Some(location), _) => location,
            (None, Some(base)) => format!("{}/{}", base.trim_end_matches('/'), key),
            (None, None) => {
                return Err(GatewayError::Upstream {
                    status: None,
                    message: "object store reported no location for the completed upload".into(),
                });
            }
        };

        info!(key, parts = parts.len(), location = %location, "multipart upload completed");
        Ok(CompleteUploadResponse { location })
    }

    /// Release the upload's parts. Unknown, aborted or completed uploads
    /// count as already aborted.
    #[instrument(skip(self, req), fields(key = ?req.key))]
    pub async fn abort_upload(&self, req: UploadRefRequest) -> GatewayResult<AbortUploadResponse> {
        let (key, upload_id) = self.upload_ref(req.key.as_deref(), req.upload_id.as_deref())?;

        match self.store.abort_multipart_upload(key, upload_id).await {
            Ok(()) => info!(key, upload_id, "multipart upload aborted"),
            Err(StoreError::NoSuchUpload(_)) => {
                info!(key, upload_id, "abort of unknown upload treated as done")
            }
            Err(err) => return Err(err.into()),
        }
        Ok(AbortUploadResponse { success: true })
    }

    fn upload_ref<'a>(
        &self,
        key: Option<&'a str>,
        upload_id: Option<&'a str>,
    ) -> GatewayResult<(&'a str, &'a str)> {
        let key = required("key", key)?;
        let upload_id = required("uploadId", upload_id)?;
        self.ensure_key_safe(key)?;
        Ok((key, upload_id))
    }

    /// Keys must stay inside the upload prefix and be free of traversal
    /// sequences and control characters.
    fn ensure_key_safe(&self, key: &str) -> GatewayResult<()> {
        let invalid = |reason: &str| Err(GatewayError::Validation(format!("invalid key: {}", reason)));

        if key.len() > MAX_OBJECT_KEY_LEN {
            return invalid("too long");
        }
        if !key.starts_with(&self.config.key_prefix) || key.len() == self.config.key_prefix.len() {
            return invalid("outside the upload prefix");
        }
        if key.starts_with('/') || key.contains("..") {
            return invalid("path traversal");
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return invalid("control characters");
        }
        Ok(())
    }
}

fn required<'a>(field: &str, value: Option<&'a str>) -> GatewayResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(GatewayError::Validation(format!("{} is required", field))),
    }
}

fn ensure_part_number(part_number: i32) -> GatewayResult<()> {
    if (1..=MAX_PART_NUMBER).contains(&part_number) {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "partNumber must be between 1 and {}",
            MAX_PART_NUMBER
        )))
    }
}

/// Sort parts and check they form the contiguous sequence 1..=N with eTags.
fn sorted_parts(mut parts: Vec<PartETag>) -> GatewayResult<Vec<PartETag>> {
    if parts.is_empty() {
        return Err(GatewayError::Validation("parts are required".into()));
    }
    parts.sort_by_key(|p| p.part_number);

    for (idx, part) in parts.iter().enumerate() {
        if part.e_tag.trim().is_empty() {
            return Err(GatewayError::Validation(format!(
                "part {} has no ETag",
                part.part_number
            )));
        }
        let expected = idx as i32 + 1;
        if part.part_number != expected {
            return Err(GatewayError::Validation(format!(
                "parts must be numbered contiguously from 1: expected {}, found {}",
                expected, part.part_number
            )));
        }
    }
    Ok(parts)
}

/// Keep the last path component and reduce it to a URL-safe alphabet.
fn sanitize_file_name(name: &str) -> GatewayResult<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");

    if cleaned.is_empty() {
        return Err(GatewayError::Validation("filename has no usable characters".into()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryObjectStore;

    fn gateway() -> GatewayService {
        GatewayService::new(
            Arc::new(MemoryObjectStore::new("media")),
            GatewayConfig::default(),
        )
    }

    async fn begin(gw: &GatewayService) -> CreateUploadResponse {
        gw.begin_upload(CreateUploadRequest {
            filename: Some("my film.mp4".into()),
            content_type: Some("video/mp4".into()),
        })
        .await
        .unwrap()
    }

    fn upload_ref(created: &CreateUploadResponse) -> UploadRefRequest {
        UploadRefRequest {
            key: Some(created.key.clone()),
            upload_id: Some(created.upload_id.clone()),
        }
    }

    #[tokio::test]
    async fn begin_generates_unique_prefixed_keys() {
        let gw = gateway();
        let a = begin(&gw).await;
        let b = begin(&gw).await;

        assert!(a.key.starts_with("uploads/"));
        assert!(a.key.ends_with("-my_film.mp4"));
        assert_ne!(a.key, b.key);
        assert_ne!(a.upload_id, b.upload_id);
    }

    #[tokio::test]
    async fn begin_requires_file_name_and_content_type() {
        let gw = gateway();
        let err = gw
            .begin_upload(CreateUploadRequest {
                filename: Some("a.mp4".into()),
                content_type: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let err = gw
            .begin_upload(CreateUploadRequest {
                filename: Some("   ".into()),
                content_type: Some("video/mp4".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let gw = gateway();
        let created = begin(&gw).await;

        let first = gw.abort_upload(upload_ref(&created)).await.unwrap();
        let second = gw.abort_upload(upload_ref(&created)).await.unwrap();
        assert!(first.success);
        assert!(second.success);
    }

    #[tokio::test]
    async fn keys_outside_the_prefix_are_rejected() {
        let gw = gateway();
        let created = begin(&gw).await;

        for key in ["secrets/db.sqlite", "uploads/../etc/passwd", "uploads/"] {
            let err = gw
                .sign_part(SignPartRequest {
                    key: Some(key.into()),
                    upload_id: Some(created.upload_id.clone()),
                    part_number: Some(1),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)), "{}", key);
        }
    }

    #[tokio::test]
    async fn sign_part_checks_part_number_range() {
        let gw = gateway();
        let created = begin(&gw).await;

        for n in [0, MAX_PART_NUMBER + 1] {
            let err = gw
                .sign_part(SignPartRequest {
                    key: Some(created.key.clone()),
                    upload_id: Some(created.upload_id.clone()),
                    part_number: Some(n),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn etag_mismatch_surfaces_as_completion_error() {
        let gw = gateway();
        let created = begin(&gw).await;

        let err = gw
            .complete_upload(CompleteUploadRequest {
                key: Some(created.key.clone()),
                upload_id: Some(created.upload_id.clone()),
                parts: Some(vec![PartETag {
                    part_number: 1,
                    e_tag: "\"deadbeef\"".into(),
                }]),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Completion(_)));
    }

    #[test]
    fn sorted_parts_orders_and_rejects_gaps() {
        let part = |n: i32| PartETag {
            part_number: n,
            e_tag: format!("\"{}\"", n),
        };

        let sorted = sorted_parts(vec![part(3), part(1), part(2)]).unwrap();
        let numbers: Vec<i32> = sorted.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        assert!(sorted_parts(vec![part(1), part(3)]).is_err());
        assert!(sorted_parts(vec![part(1), part(1)]).is_err());
        assert!(sorted_parts(Vec::new()).is_err());
    }

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_file_name("C:\\videos\\a b&c.mov").unwrap(), "a_b_c.mov");
        assert_eq!(sanitize_file_name("../../x.mp4").unwrap(), "x.mp4");
        assert!(sanitize_file_name("...").is_err());
    }
}
