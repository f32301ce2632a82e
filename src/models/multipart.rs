//! Multipart upload types shared by the gateway endpoint and the upload client.
//!
//! Field names follow the gateway's JSON contract: request envelopes are
//! camelCase, individual parts use the object store's `PartNumber` / `ETag` /
//! `Size` spelling so they can be forwarded verbatim.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Largest part number accepted by S3-compatible stores.
pub const MAX_PART_NUMBER: i32 = 10_000;

/// Operation selected through the `action` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayAction {
    CreateMultipartUpload,
    ListParts,
    SignPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
}

impl GatewayAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateMultipartUpload => "createMultipartUpload",
            Self::ListParts => "listParts",
            Self::SignPart => "signPart",
            Self::CompleteMultipartUpload => "completeMultipartUpload",
            Self::AbortMultipartUpload => "abortMultipartUpload",
        }
    }
}

impl fmt::Display for GatewayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createMultipartUpload" => Ok(Self::CreateMultipartUpload),
            "listParts" => Ok(Self::ListParts),
            "signPart" => Ok(Self::SignPart),
            "completeMultipartUpload" => Ok(Self::CompleteMultipartUpload),
            "abortMultipartUpload" => Ok(Self::AbortMultipartUpload),
            other => Err(format!("Unknown action `{}`", other)),
        }
    }
}

/// Identifies one multipart upload: the object key plus the store's upload id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct UploadHandle {
    pub key: String,
    pub upload_id: String,
}

/// A part as recorded by the object store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredPart {
    #[serde(rename = "PartNumber")]
    pub part_number: i32,
    #[serde(rename = "Size")]
    pub size: i64,
    #[serde(rename = "ETag")]
    pub e_tag: String,
}

/// Part number plus the eTag the store returned for it; submitted on completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PartETag {
    #[serde(rename = "PartNumber", alias = "partNumber")]
    pub part_number: i32,
    #[serde(rename = "ETag", alias = "eTag", alias = "etag")]
    pub e_tag: String,
}

/// Body of `createMultipartUpload`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    #[serde(alias = "fileName")]
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Body of `listParts` and `abortMultipartUpload`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadRefRequest {
    pub key: Option<String>,
    pub upload_id: Option<String>,
}

/// Body of `signPart`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SignPartRequest {
    pub key: Option<String>,
    pub upload_id: Option<String>,
    pub part_number: Option<i32>,
}

/// Body of `completeMultipartUpload`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest {
    pub key: Option<String>,
    pub upload_id: Option<String>,
    pub parts: Option<Vec<PartETag>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub key: String,
    pub upload_id: String,
}

impl From<CreateUploadResponse> for UploadHandle {
    fn from(resp: CreateUploadResponse) -> Self {
        Self {
            key: resp.key,
            upload_id: resp.upload_id,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ListPartsResponse {
    pub parts: Vec<StoredPart>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SignPartResponse {
    pub url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CompleteUploadResponse {
    pub location: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AbortUploadResponse {
    pub success: bool,
}
