//! Client half of the resumable multipart upload protocol.
//!
//! Files are split into parts, each part is uploaded directly to the object
//! store over a short-lived signed URL, and the gateway is asked to assemble
//! them. No credentials are needed on this side.

pub mod error;
pub mod gateway_client;
pub mod plan;
pub mod session;
pub mod source;
pub mod transport;

pub use error::{UploadError, UploadResult};
pub use gateway_client::{GatewayApi, GatewayClient};
pub use plan::{DEFAULT_PART_SIZE, MIB, MIN_PART_SIZE, PartSpec, plan_parts};
pub use session::{
    ResumeToken, SessionSnapshot, UploadConfig, UploadManager, UploadOutcome, UploadStatus,
};
pub use source::{BytesSource, FileSource, UploadSource};
pub use transport::{HttpTransport, PartTransport, TransferError};
