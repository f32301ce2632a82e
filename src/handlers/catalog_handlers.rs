//! HTTP handlers for catalog records under `/media`.
//! Reads are public; writes require the admin bearer token.

use super::parse_body;
use crate::{
    errors::AppError,
    models::media::{MediaFilter, MediaRecord, NewMediaRecord},
    routes::routes::AppState,
    services::embed::{Embed, resolve_embed},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

/// A record together with how to play it.
#[derive(Debug, Serialize)]
pub struct MediaDetail {
    #[serde(flatten)]
    pub record: MediaRecord,
    pub embed: Embed,
}

/// `GET /media?category=&limit=`
pub async fn list_media(
    State(state): State<AppState>,
    Query(filter): Query<MediaFilter>,
) -> Result<Json<Vec<MediaRecord>>, AppError> {
    Ok(Json(state.catalog.list(&filter).await?))
}

/// `GET /media/{id}`
pub async fn get_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MediaDetail>, AppError> {
    let record = state.catalog.get_by_id(id).await?;
    let embed = resolve_embed(&record.media_url);
    Ok(Json(MediaDetail { record, embed }))
}

/// `POST /media`
pub async fn create_media(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.admin.verify(&headers)?;
    let record: NewMediaRecord = parse_body(&body)?;
    let created = state.catalog.insert(record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /media/{id}`
pub async fn update_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MediaRecord>, AppError> {
    state.admin.verify(&headers)?;
    let record: NewMediaRecord = parse_body(&body)?;
    Ok(Json(state.catalog.update(id, record).await?))
}

/// `DELETE /media/{id}`
pub async fn delete_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    state.admin.verify(&headers)?;
    state.catalog.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
