//! src/services/catalog.rs
//!
//! Catalog record store. Media records live in a single SQLite table; the
//! HTTP layer and the publish flow only see the `CatalogStore` trait.

use crate::models::media::{DEFAULT_CATEGORY, MediaFilter, MediaRecord, NewMediaRecord};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");
const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    Validation(String),
    #[error("media `{0}` not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert(&self, record: NewMediaRecord) -> CatalogResult<MediaRecord>;
    async fn update(&self, id: Uuid, record: NewMediaRecord) -> CatalogResult<MediaRecord>;
    async fn delete(&self, id: Uuid) -> CatalogResult<()>;
    /// Newest first.
    async fn list(&self, filter: &MediaFilter) -> CatalogResult<Vec<MediaRecord>>;
    async fn get_by_id(&self, id: Uuid) -> CatalogResult<MediaRecord>;
    async fn ping(&self) -> CatalogResult<()>;
}

#[derive(Clone)]
pub struct SqliteCatalogStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteCatalogStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the bundled schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> CatalogResult<()> {
        let statements = MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());
        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

fn validated(record: NewMediaRecord) -> CatalogResult<NewMediaRecord> {
    record.normalized().map_err(CatalogError::Validation)
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn insert(&self, record: NewMediaRecord) -> CatalogResult<MediaRecord> {
        let record = validated(record)?;

        let inserted = sqlx::query_as::<_, MediaRecord>(
            r#"
            INSERT INTO media (id, title, description, cover_url, media_url, category, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, title, description, cover_url, media_url, category, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.cover_url)
        .bind(&record.media_url)
        .bind(record.category.as_deref().unwrap_or(DEFAULT_CATEGORY))
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        info!(id = %inserted.id, title = %inserted.title, "media record created");
        Ok(inserted)
    }

    async fn update(&self, id: Uuid, record: NewMediaRecord) -> CatalogResult<MediaRecord> {
        let record = validated(record)?;

        sqlx::query_as::<_, MediaRecord>(
            r#"
            UPDATE media
            SET title = ?, description = ?, cover_url = ?, media_url = ?, category = ?
            WHERE id = ?
            RETURNING id, title, description, cover_url, media_url, category, created_at
            "#,
        )
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.cover_url)
        .bind(&record.media_url)
        .bind(record.category.as_deref().unwrap_or(DEFAULT_CATEGORY))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(CatalogError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> CatalogResult<()> {
        let result = sqlx::query("DELETE FROM media WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(id));
        }
        info!(%id, "media record deleted");
        Ok(())
    }

    async fn list(&self, filter: &MediaFilter) -> CatalogResult<Vec<MediaRecord>> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, title, description, cover_url, media_url, category, created_at FROM media",
        );
        if let Some(category) = filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            builder.push(" WHERE category = ");
            builder.push_bind(category.to_string());
        }
        builder.push(" ORDER BY created_at DESC, rowid DESC LIMIT ");
        builder.push_bind(limit);

        let rows: Vec<MediaRecord> = builder.build_query_as().fetch_all(&*self.db).await?;
        debug!(count = rows.len(), "listed media records");
        Ok(rows)
    }

    async fn get_by_id(&self, id: Uuid) -> CatalogResult<MediaRecord> {
        sqlx::query_as::<_, MediaRecord>(
            "SELECT id, title, description, cover_url, media_url, category, created_at FROM media WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(CatalogError::NotFound(id))
    }

    async fn ping(&self) -> CatalogResult<()> {
        sqlx::query("SELECT 1").execute(&*self.db).await?;
        Ok(())
    }
}
