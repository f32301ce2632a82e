//! In-memory object store for tests and local development.
//!
//! Implements both sides of the protocol: the privileged `ObjectStore` calls
//! the gateway makes, and `PartTransport` for the direct part uploads a client
//! performs against the signed URLs it hands out. Signed URLs carry an MD5
//! signature over key, upload id, part number and expiry, so a URL signed for
//! one part cannot be replayed for another.

use crate::{
    models::multipart::{PartETag, StoredPart},
    services::object_store::{ObjectStore, StoreError, StoreResult},
    uploader::transport::{PartTransport, TransferError},
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use tracing::debug;
use uuid::Uuid;

const SCHEME: &str = "memory://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug)]
struct PendingUpload {
    key: String,
    content_type: String,
    parts: BTreeMap<i32, (Bytes, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    uploads: HashMap<String, PendingUpload>,
    objects: HashMap<String, StoredObject>,
}

#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    secret: String,
    state: Mutex<MemoryState>,
}

/// Fields recovered from a signed part URL.
#[derive(Debug, PartialEq, Eq)]
struct SignedPart {
    key: String,
    upload_id: String,
    part_number: i32,
    expires: i64,
    signature: String,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            secret: Uuid::new_v4().simple().to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sign(&self, key: &str, upload_id: &str, part_number: i32, expires: i64) -> String {
        let digest = md5::compute(format!(
            "{}\n{}\n{}\n{}\n{}",
            self.secret, key, upload_id, part_number, expires
        ));
        format!("{:x}", digest)
    }

    fn location(&self, key: &str) -> String {
        format!("{}{}/{}", SCHEME, self.bucket, key)
    }

    /// A completed object, if one exists under `key`.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state().objects.get(key).cloned()
    }

    /// Number of multipart uploads that are neither completed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.state().uploads.len()
    }

    fn parse_url(&self, url: &str) -> Option<SignedPart> {
        let rest = url.strip_prefix(SCHEME)?;
        let rest = rest.strip_prefix(self.bucket.as_str())?.strip_prefix('/')?;
        let (key, query) = rest.split_once('?')?;

        let mut upload_id = None;
        let mut part_number = None;
        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=')? {
                ("uploadId", v) => upload_id = Some(v.to_string()),
                ("partNumber", v) => part_number = v.parse().ok(),
                ("expires", v) => expires = v.parse().ok(),
                ("signature", v) => signature = Some(v.to_string()),
                _ => {}
            }
        }

        Some(SignedPart {
            key: key.to_string(),
            upload_id: upload_id?,
            part_number: part_number?,
            expires: expires?,
            signature: signature?,
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> StoreResult<String> {
        let upload_id = Uuid::new_v4().simple().to_string();
        self.state().uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        debug!(key, upload_id = %upload_id, "memory: multipart upload created");
        Ok(upload_id)
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> StoreResult<Vec<StoredPart>> {
        let state = self.state();
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;

        Ok(upload
            .parts
            .iter()
            .map(|(number, (data, etag))| StoredPart {
                part_number: *number,
                size: data.len() as i64,
                e_tag: etag.clone(),
            })
            .collect())
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StoreResult<String> {
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let signature = self.sign(key, upload_id, part_number, expires);
        Ok(format!(
            "{}?uploadId={}&partNumber={}&expires={}&signature={}",
            self.location(key),
            upload_id,
            part_number,
            expires,
            signature
        ))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> StoreResult<Option<String>> {
        let mut state = self.state();
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;

        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StoreError::InvalidParts(
                "InvalidPartOrder: parts must be in ascending order".into(),
            ));
        }

        let mut body = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((data, etag)) if *etag == part.e_tag => body.extend_from_slice(data),
                Some(_) => {
                    return Err(StoreError::InvalidParts(format!(
                        "InvalidPart: eTag mismatch for part {}",
                        part.part_number
                    )));
                }
                None => {
                    return Err(StoreError::InvalidParts(format!(
                        "InvalidPart: part {} was never uploaded",
                        part.part_number
                    )));
                }
            }
        }

        let content_type = upload.content_type.clone();
        state.uploads.remove(upload_id);
        state.objects.insert(
            key.to_string(),
            StoredObject {
                content_type,
                data: body.freeze(),
            },
        );
        Ok(Some(self.location(key)))
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> StoreResult<()> {
        match self.state().uploads.remove(upload_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NoSuchUpload(upload_id.to_string())),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl PartTransport for MemoryObjectStore {
    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, TransferError> {
        let signed = self.parse_url(url).ok_or_else(|| TransferError::Rejected {
            status: 400,
            message: "malformed part URL".into(),
        })?;

        let expected = self.sign(
            &signed.key,
            &signed.upload_id,
            signed.part_number,
            signed.expires,
        );
        if expected != signed.signature {
            return Err(TransferError::Rejected {
                status: 403,
                message: "SignatureDoesNotMatch".into(),
            });
        }
        if Utc::now().timestamp() >= signed.expires {
            return Err(TransferError::Expired(format!(
                "Request has expired for part {}",
                signed.part_number
            )));
        }

        let mut state = self.state();
        let upload = state
            .uploads
            .get_mut(&signed.upload_id)
            .filter(|u| u.key == signed.key)
            .ok_or_else(|| TransferError::Rejected {
                status: 404,
                message: "NoSuchUpload".into(),
            })?;

        let etag = format!("\"{:x}\"", md5::compute(&body));
        upload
            .parts
            .insert(signed.part_number, (body, etag.clone()));
        Ok(etag)
    }
}
