use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::admin_auth::AdminActor;
use crate::services::lifecycle::ReferenceTarget;
use axum::{
    Extension, Json,
    extract::{Query, State},
};
use validator::Validate;

use super::types::*;

/// Links an asset to an entity and derives its flags right away, so the
/// response already reflects the confirmed state.
#[utoipa::path(
    post,
    path = "/admin/references",
    request_body = AddReferenceRequest,
    responses(
        (status = 200, description = "Reference recorded (idempotent per slot)", body = ReferenceResponse),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Asset not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "references"
)]
pub async fn add_reference(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(req): Json<AddReferenceRequest>,
) -> Result<Json<ReferenceResponse>, AppError> {
    req.validate()?;

    let target = ReferenceTarget {
        entity_type: req.entity_type,
        entity_id: req.entity_id,
        field_name: req.field_name,
        reference_kind: req.reference_kind,
    };
    let reference = state
        .service
        .add_reference(req.asset_id, &target, actor.0.as_deref())
        .await?;
    state.service.recompute_reference_count(req.asset_id).await?;

    Ok(Json(reference.into()))
}

#[utoipa::path(
    delete,
    path = "/admin/references",
    request_body = RemoveReferenceRequest,
    responses(
        (status = 200, description = "References released", body = RemoveReferenceResponse),
        (status = 404, description = "No active reference matched"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "references"
)]
pub async fn remove_reference(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(req): Json<RemoveReferenceRequest>,
) -> Result<Json<RemoveReferenceResponse>, AppError> {
    req.validate()?;

    let released = state
        .service
        .remove_reference(req.asset_id, &req.entity_type, &req.entity_id, actor.0.as_deref())
        .await?;
    state.service.recompute_reference_count(req.asset_id).await?;

    Ok(Json(RemoveReferenceResponse {
        asset_id: req.asset_id,
        released,
    }))
}

#[utoipa::path(
    get,
    path = "/admin/references",
    params(ReferenceQuery),
    responses(
        (status = 200, description = "Active references", body = Vec<ReferenceResponse>),
        (status = 400, description = "Neither asset_id nor entity_type/entity_id given"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "references"
)]
pub async fn list_references(
    State(state): State<AppState>,
    Query(query): Query<ReferenceQuery>,
) -> Result<Json<Vec<ReferenceResponse>>, AppError> {
    let references = match (query.asset_id, query.entity_type, query.entity_id) {
        (Some(asset_id), _, _) => state.service.get_references_for_asset(asset_id).await?,
        (None, Some(entity_type), Some(entity_id)) => {
            state
                .service
                .get_references_for(&entity_type, &entity_id)
                .await?
        }
        _ => {
            return Err(AppError::BadRequest(
                "asset_id or entity_type and entity_id are required".to_string(),
            ));
        }
    };

    Ok(Json(references.into_iter().map(Into::into).collect()))
}

/// Entity teardown: releases every reference the entity holds.
#[utoipa::path(
    post,
    path = "/admin/entities/release",
    request_body = ReleaseEntityRequest,
    responses(
        (status = 200, description = "References released", body = ReleaseEntityResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "references"
)]
pub async fn release_entity(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(req): Json<ReleaseEntityRequest>,
) -> Result<Json<ReleaseEntityResponse>, AppError> {
    req.validate()?;

    let affected_assets = state
        .service
        .release_entity_references(&req.entity_type, &req.entity_id, actor.0.as_deref())
        .await?;
    for asset_id in &affected_assets {
        state.service.recompute_reference_count(*asset_id).await?;
    }

    Ok(Json(ReleaseEntityResponse { affected_assets }))
}
