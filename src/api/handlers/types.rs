use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::entities::{asset_references, assets, cleanup_jobs};
use crate::services::lifecycle::{CleanupJobKind, CleanupResult};

#[derive(Serialize, ToSchema)]
pub struct AssetResponse {
    pub id: i32,
    pub public_id: String,
    pub url: String,
    pub name: String,
    pub media_kind: String,
    pub byte_size: i64,
    pub folder: Option<String>,
    pub mime_type: Option<String>,
    pub uploader_id: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub is_temporary: bool,
    pub is_orphaned: bool,
    pub marked_for_deletion_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<assets::Model> for AssetResponse {
    fn from(asset: assets::Model) -> Self {
        Self {
            tags: asset.tag_list(),
            id: asset.id,
            public_id: asset.public_id,
            url: asset.url,
            name: asset.name,
            media_kind: asset.media_kind,
            byte_size: asset.byte_size,
            folder: asset.folder,
            mime_type: asset.mime_type,
            uploader_id: asset.uploader_id,
            metadata: asset.metadata,
            is_temporary: asset.is_temporary,
            is_orphaned: asset.is_orphaned,
            marked_for_deletion_at: asset.marked_for_deletion_at,
            created_at: asset.created_at,
            updated_at: asset.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReferenceResponse {
    pub id: i32,
    pub asset_id: i32,
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: Option<String>,
    pub reference_kind: String,
    pub creator_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<asset_references::Model> for ReferenceResponse {
    fn from(r: asset_references::Model) -> Self {
        Self {
            id: r.id,
            asset_id: r.asset_id,
            entity_type: r.entity_type,
            entity_id: r.entity_id,
            field_name: r.field_name,
            reference_kind: r.reference_kind,
            creator_id: r.creator_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct JobResponse {
    pub id: i32,
    pub job_type: String,
    pub status: String,
    pub parameters: Value,
    pub files_processed: i32,
    pub files_deleted: i32,
    pub files_failed: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<cleanup_jobs::Model> for JobResponse {
    fn from(job: cleanup_jobs::Model) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            status: job.status,
            parameters: job.parameters,
            files_processed: job.files_processed,
            files_deleted: job.files_deleted,
            files_failed: job.files_failed,
            error_message: job.error_message,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
        }
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssetLookupQuery {
    pub public_id: String,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct BatchDeleteRequest {
    #[validate(length(min = 1, max = 1000, message = "Between 1 and 1000 ids are required"))]
    pub ids: Vec<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub asset_id: i32,
    pub deleted: bool,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct AddReferenceRequest {
    pub asset_id: i32,
    #[validate(length(min = 1, max = 64, message = "entity_type is required"))]
    pub entity_type: String,
    #[validate(length(min = 1, max = 255, message = "entity_id is required"))]
    pub entity_id: String,
    #[validate(length(max = 64))]
    pub field_name: Option<String>,
    #[validate(length(max = 32))]
    pub reference_kind: Option<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct RemoveReferenceRequest {
    pub asset_id: i32,
    #[validate(length(min = 1, max = 64, message = "entity_type is required"))]
    pub entity_type: String,
    #[validate(length(min = 1, max = 255, message = "entity_id is required"))]
    pub entity_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct RemoveReferenceResponse {
    pub asset_id: i32,
    pub released: u64,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct ReleaseEntityRequest {
    #[validate(length(min = 1, max = 64, message = "entity_type is required"))]
    pub entity_type: String,
    #[validate(length(min = 1, max = 255, message = "entity_id is required"))]
    pub entity_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReleaseEntityResponse {
    pub affected_assets: Vec<i32>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReferenceQuery {
    pub asset_id: Option<i32>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
}

#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct CleanupQuery {
    /// List what would be deleted without deleting anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Overrides the configured temporary max age.
    pub max_age_hours: Option<u64>,
    /// Overrides the configured orphan grace period.
    pub grace_period_hours: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct CleanupResponse {
    pub dry_run: bool,
    /// Assets in scope; only filled for dry runs.
    pub candidates: Vec<AssetResponse>,
    pub result: Option<CleanupResult>,
}

#[derive(Serialize, ToSchema)]
pub struct MarkOrphanedResponse {
    pub marked: u64,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct ScheduleJobRequest {
    pub job_type: CleanupJobKind,
    /// Required for `manual` jobs.
    pub ids: Option<Vec<i32>>,
    #[validate(range(min = 1, max = 8760))]
    pub hours: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct JobListQuery {
    pub limit: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    pub asset_id: Option<i32>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Upload notification from the storage provider.
#[derive(Deserialize, ToSchema, Validate)]
pub struct UploadWebhookRequest {
    #[validate(url(message = "url must be an absolute URL"))]
    pub url: String,
    /// Derived from `url` when omitted.
    pub public_id: Option<String>,
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub media_kind: String,
    #[validate(range(min = 1, message = "byte_size must be positive"))]
    pub byte_size: i64,
    pub folder: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
    pub uploader_id: Option<String>,
}

/// Deletion notification from the storage provider; either field identifies the object.
#[derive(Deserialize, ToSchema)]
pub struct DeleteWebhookRequest {
    pub public_id: Option<String>,
    pub url: Option<String>,
}
