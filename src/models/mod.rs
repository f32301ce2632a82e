//! Core data models for the catalog and the multipart upload protocol.
//!
//! Catalog records map to SQLite rows via `sqlx::FromRow`; every model
//! serializes as JSON via `serde`.

pub mod media;
pub mod multipart;
