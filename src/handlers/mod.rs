use crate::errors::AppError;
use axum::body::Bytes;
use serde::de::DeserializeOwned;

pub mod catalog_handlers;
pub mod gateway_handlers;
pub mod health_handlers;

/// Decode a JSON request body once the caller is authorized. A blank body
/// reads as `T::default()`; malformed JSON is a 400 in the usual error shape.
pub(crate) fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::bad_request(format!("invalid JSON body: {}", e)))
}
