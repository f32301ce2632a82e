//! The gateway's single HTTP entry point: `POST /s3-multipart?action=...`.
//!
//! Every action takes a JSON body; a missing or empty body reads as `{}` so
//! the gateway reports the missing fields instead of a parse error.

use super::parse_body;
use crate::{
    errors::AppError,
    models::multipart::GatewayAction,
    routes::routes::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

pub async fn s3_multipart(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    state.admin.verify(&headers)?;

    let action: GatewayAction = query
        .action
        .as_deref()
        .ok_or_else(|| AppError::bad_request("Missing action"))?
        .parse()
        .map_err(AppError::bad_request)?;
    debug!(%action, bytes = body.len(), "gateway request");

    let gateway = &state.gateway;
    let response = match action {
        GatewayAction::CreateMultipartUpload => {
            Json(gateway.begin_upload(parse_body(&body)?).await?).into_response()
        }
        GatewayAction::ListParts => Json(gateway.list_parts(parse_body(&body)?).await?).into_response(),
        GatewayAction::SignPart => Json(gateway.sign_part(parse_body(&body)?).await?).into_response(),
        GatewayAction::CompleteMultipartUpload => {
            Json(gateway.complete_upload(parse_body(&body)?).await?).into_response()
        }
        GatewayAction::AbortMultipartUpload => {
            Json(gateway.abort_upload(parse_body(&body)?).await?).into_response()
        }
    };
    Ok(response)
}
