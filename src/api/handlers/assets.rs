use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::admin_auth::AdminActor;
use crate::services::lifecycle::{AssetStatistics, CleanupResult};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use validator::Validate;

use super::types::*;

#[utoipa::path(
    get,
    path = "/admin/statistics",
    responses(
        (status = 200, description = "Aggregate asset and job counters", body = AssetStatistics),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn get_statistics(
    State(state): State<AppState>,
) -> Result<Json<AssetStatistics>, AppError> {
    Ok(Json(state.service.get_statistics().await?))
}

#[utoipa::path(
    get,
    path = "/admin/assets",
    params(AssetLookupQuery),
    responses(
        (status = 200, description = "Asset found", body = AssetResponse),
        (status = 404, description = "No live asset with this public id"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn get_asset_by_public_id(
    State(state): State<AppState>,
    Query(query): Query<AssetLookupQuery>,
) -> Result<Json<AssetResponse>, AppError> {
    let asset = state
        .service
        .get_asset_by_public_id(&query.public_id)
        .await?;
    Ok(Json(asset.into()))
}

#[utoipa::path(
    get,
    path = "/admin/assets/{id}",
    params(("id" = i32, Path, description = "Asset id")),
    responses(
        (status = 200, description = "Asset found", body = AssetResponse),
        (status = 404, description = "Asset not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<AssetResponse>, AppError> {
    Ok(Json(state.service.get_asset(id).await?.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/assets/{id}",
    params(("id" = i32, Path, description = "Asset id")),
    responses(
        (status = 200, description = "Asset deleted from store and database", body = DeleteResponse),
        (status = 404, description = "Asset not found"),
        (status = 502, description = "Object store delete failed"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn delete_asset(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Path(id): Path<i32>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.service.delete_asset(id, actor.0.as_deref()).await?;
    Ok(Json(DeleteResponse {
        asset_id: id,
        deleted: true,
    }))
}

#[utoipa::path(
    post,
    path = "/admin/batch-delete",
    request_body = BatchDeleteRequest,
    responses(
        (status = 200, description = "Batch processed; check files_failed for partial failures", body = CleanupResult),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn batch_delete(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(req): Json<BatchDeleteRequest>,
) -> Result<Json<CleanupResult>, AppError> {
    req.validate()?;

    let result = state
        .service
        .batch_cleanup_files(req.ids, actor.0.as_deref(), &state.service.shutdown_token())
        .await?;
    Ok(Json(result))
}
