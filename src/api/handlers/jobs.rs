use crate::AppState;
use crate::api::error::AppError;
use crate::api::middleware::admin_auth::AdminActor;
use crate::services::lifecycle::{CleanupJobKind, CleanupRequest};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

use super::cleanup::hours;
use super::types::*;

/// Records a pending job and runs it in the background; poll
/// `GET /admin/jobs/{id}` for progress.
#[utoipa::path(
    post,
    path = "/admin/jobs",
    request_body = ScheduleJobRequest,
    responses(
        (status = 202, description = "Job accepted", body = JobResponse),
        (status = 400, description = "Bad request"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "cleanup"
)]
pub async fn schedule_job(
    State(state): State<AppState>,
    Extension(actor): Extension<AdminActor>,
    Json(req): Json<ScheduleJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    req.validate()?;

    let request = match req.job_type {
        CleanupJobKind::TemporaryCleanup => CleanupRequest::Temporary {
            max_age: hours(req.hours, state.config.temp_max_age())?,
        },
        CleanupJobKind::OrphanCleanup => CleanupRequest::Orphaned {
            grace_period: hours(req.hours, state.config.orphan_grace_period())?,
        },
        CleanupJobKind::Manual => CleanupRequest::Manual {
            ids: req
                .ids
                .ok_or_else(|| AppError::BadRequest("ids are required for manual jobs".to_string()))?,
        },
    };

    let job = state.service.schedule_cleanup_job(request, actor.0).await?;
    Ok((StatusCode::ACCEPTED, Json(job.into())))
}

#[utoipa::path(
    get,
    path = "/admin/jobs",
    params(JobListQuery),
    responses(
        (status = 200, description = "Most recent cleanup jobs", body = Vec<JobResponse>),
        (status = 401, description = "Unauthorized")
    ),
    tag = "cleanup"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<JobResponse>>, AppError> {
    let jobs = state
        .service
        .list_cleanup_jobs(query.limit.unwrap_or(20))
        .await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/admin/jobs/{id}",
    params(("id" = i32, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job found", body = JobResponse),
        (status = 404, description = "Job not found"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "cleanup"
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<JobResponse>, AppError> {
    Ok(Json(state.service.get_cleanup_job(id).await?.into()))
}
