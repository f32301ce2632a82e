//! Admin bearer token check.
//!
//! There is a single privileged role: callers presenting the configured token
//! may upload and write catalog records, everyone else may only read.

use crate::errors::AppError;
use axum::http::{HeaderMap, header};
use std::{fmt, sync::Arc};
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AdminToken(Arc<str>);

impl AdminToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::from(token.into()))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        !self.0.is_empty() && bool::from(self.0.as_bytes().ct_eq(candidate.as_bytes()))
    }

    /// Require `Authorization: Bearer <token>`.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))?;

        if self.matches(presented) {
            Ok(())
        } else {
            Err(AppError::unauthorized("invalid bearer token"))
        }
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(<redacted>)")
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}
