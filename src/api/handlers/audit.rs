use crate::AppState;
use crate::api::error::AppError;
use crate::services::lifecycle::{AuditLogFilter, AuditLogPage};
use axum::{
    Json,
    extract::{Query, State},
};

use super::types::AuditLogQuery;

#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = AuditLogPage),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn get_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogPage>, AppError> {
    let filter = AuditLogFilter {
        asset_id: query.asset_id,
        action: query.action,
        actor_id: query.actor_id,
        from: query.from,
        to: query.to,
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.service.get_audit_logs(&filter).await?))
}
