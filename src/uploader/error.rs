use std::io;
use thiserror::Error;

/// Failures surfaced by the upload client.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Bad input, detected before or by the gateway.
    #[error("invalid upload request: {0}")]
    Validation(String),
    /// The gateway or the object store failed.
    #[error("upstream failure{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },
    /// The store refused to assemble the parts; retrying blindly will not help.
    #[error("upload completion rejected: {0}")]
    Completion(String),
    #[error("signed URL for part {part_number} expired")]
    ExpiredUrl { part_number: i32 },
    #[error("upload cancelled")]
    Cancelled,
    /// Another file was selected while this one was uploading.
    #[error("upload replaced by a newer selection")]
    Superseded,
    #[error("part {part_number} failed after {attempts} attempts: {message}")]
    PartFailed {
        part_number: i32,
        attempts: u32,
        message: String,
    },
    #[error("invalid resume token: {0}")]
    InvalidResumeToken(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Whether a part attempt that failed this way is worth re-signing and retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::ExpiredUrl { .. } => true,
            UploadError::Upstream { status, .. } => match status {
                None => true,
                Some(s) => *s >= 500 || *s == 408 || *s == 429,
            },
            _ => false,
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
