use crate::AppState;
use crate::api::error::AppError;
use crate::services::lifecycle::AssetDescriptor;
use axum::{Json, extract::State, http::StatusCode};
use validator::Validate;

use super::types::*;

/// The provider confirmed an upload: register it as a temporary asset.
#[utoipa::path(
    post,
    path = "/webhooks/upload",
    request_body = UploadWebhookRequest,
    responses(
        (status = 201, description = "Asset registered as temporary", body = AssetResponse),
        (status = 400, description = "Bad request"),
        (status = 409, description = "Public id already registered"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "webhooks"
)]
pub async fn upload_webhook(
    State(state): State<AppState>,
    Json(req): Json<UploadWebhookRequest>,
) -> Result<(StatusCode, Json<AssetResponse>), AppError> {
    req.validate()?;

    let public_id = match req.public_id.filter(|p| !p.is_empty()) {
        Some(public_id) => public_id,
        None => state.storage.resolve_public_id(&req.url).ok_or_else(|| {
            AppError::BadRequest(format!("cannot derive a public id from '{}'", req.url))
        })?,
    };
    let name = req.name.unwrap_or_else(|| {
        public_id
            .rsplit('/')
            .next()
            .unwrap_or(public_id.as_str())
            .to_string()
    });

    let asset = state
        .service
        .register_asset(AssetDescriptor {
            public_id,
            url: req.url,
            name,
            media_kind: req.media_kind,
            byte_size: req.byte_size,
            folder: req.folder,
            mime_type: req.mime_type,
            tags: req.tags,
            metadata: req.metadata,
            uploader_id: req.uploader_id,
            temporary: Some(true),
            initial_reference: None,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(asset.into())))
}

/// The provider reports the object as gone.
#[utoipa::path(
    post,
    path = "/webhooks/delete",
    request_body = DeleteWebhookRequest,
    responses(
        (status = 200, description = "Asset retired", body = DeleteResponse),
        (status = 400, description = "Neither public_id nor a resolvable url given"),
        (status = 404, description = "Asset not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "webhooks"
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    Json(req): Json<DeleteWebhookRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let public_id = req
        .public_id
        .filter(|p| !p.is_empty())
        .or_else(|| {
            req.url
                .as_deref()
                .and_then(|url| state.storage.resolve_public_id(url))
        })
        .ok_or_else(|| AppError::BadRequest("public_id or url is required".to_string()))?;

    let asset = state
        .service
        .handle_external_deletion(&public_id, Some("storage_provider"))
        .await?;

    Ok(Json(DeleteResponse {
        asset_id: asset.id,
        deleted: true,
    }))
}
