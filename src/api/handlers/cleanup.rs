use crate::AppState;
use crate::api::error::AppError;
use crate::config::{MAX_WINDOW_HOURS, window_from_hours};
use crate::services::lifecycle::CleanupRequest;
use axum::{
    Json,
    extract::{Query, State},
};
use std::time::Duration;

use super::types::*;

pub(super) fn hours(value: Option<u64>, fallback: Duration) -> Result<Duration, AppError> {
    match value {
        None => Ok(fallback),
        Some(h) => window_from_hours(h).ok_or_else(|| {
            AppError::BadRequest(format!("{} hours exceeds the limit of {}", h, MAX_WINDOW_HOURS))
        }),
    }
}

async fn run_or_preview(
    state: &AppState,
    request: CleanupRequest,
    dry_run: bool,
) -> Result<CleanupResponse, AppError> {
    if dry_run {
        let candidates = state.service.preview_cleanup(&request).await?;
        return Ok(CleanupResponse {
            dry_run: true,
            candidates: candidates.into_iter().map(Into::into).collect(),
            result: None,
        });
    }

    let result = state
        .service
        .run_cleanup(request, None, &state.service.shutdown_token())
        .await?;
    Ok(CleanupResponse {
        dry_run: false,
        candidates: Vec::new(),
        result: Some(result),
    })
}

#[utoipa::path(
    post,
    path = "/admin/cleanup/temporary",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Temporary sweep result or preview", body = CleanupResponse),
        (status = 400, description = "Window out of range"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "cleanup"
)]
pub async fn cleanup_temporary(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupResponse>, AppError> {
    let max_age = hours(query.max_age_hours, state.config.temp_max_age())?;
    let response = run_or_preview(&state, CleanupRequest::Temporary { max_age }, query.dry_run).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/admin/cleanup/orphaned",
    params(CleanupQuery),
    responses(
        (status = 200, description = "Orphan sweep result or preview", body = CleanupResponse),
        (status = 400, description = "Window out of range"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "cleanup"
)]
pub async fn cleanup_orphaned(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> Result<Json<CleanupResponse>, AppError> {
    let grace_period = hours(query.grace_period_hours, state.config.orphan_grace_period())?;
    let response = run_or_preview(
        &state,
        CleanupRequest::Orphaned { grace_period },
        query.dry_run,
    )
    .await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/admin/mark-orphaned",
    responses(
        (status = 200, description = "Assets newly flagged as orphaned", body = MarkOrphanedResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "cleanup"
)]
pub async fn mark_orphaned(
    State(state): State<AppState>,
) -> Result<Json<MarkOrphanedResponse>, AppError> {
    let marked = state.service.mark_orphaned_assets().await?;
    Ok(Json(MarkOrphanedResponse { marked }))
}
