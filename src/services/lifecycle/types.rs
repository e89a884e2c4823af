use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::cleanup_jobs;

/// What an uploader knows about a freshly stored object.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AssetDescriptor {
    #[validate(length(min = 1, max = 512, message = "public_id is required"))]
    pub public_id: String,
    #[validate(url(message = "url must be an absolute URL"))]
    pub url: String,
    #[validate(length(min = 1, max = 255, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "media_kind is required"))]
    pub media_kind: String,
    #[validate(range(min = 1, message = "byte_size must be positive"))]
    pub byte_size: i64,
    #[validate(length(max = 255))]
    pub folder: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub uploader_id: Option<String>,
    /// Defaults to true: the asset is pending its first reference.
    pub temporary: Option<bool>,
    /// Links the asset right away; the asset is then registered as confirmed.
    pub initial_reference: Option<ReferenceTarget>,
}

/// The slot a business entity uses an asset in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReferenceTarget {
    pub entity_type: String,
    pub entity_id: String,
    pub field_name: Option<String>,
    pub reference_kind: Option<String>,
}

impl ReferenceTarget {
    pub fn new(entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            ..Default::default()
        }
    }

    pub fn field(mut self, field_name: &str) -> Self {
        self.field_name = Some(field_name.to_string());
        self
    }

    pub fn kind(mut self, reference_kind: &str) -> Self {
        self.reference_kind = Some(reference_kind.to_string());
        self
    }
}

/// Result of deriving an asset's flags from its active reference count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReferenceCountOutcome {
    pub asset_id: i32,
    pub active_references: u64,
    pub is_temporary: bool,
    pub is_orphaned: bool,
    /// True only for the recomputation that flipped the asset to orphaned.
    pub newly_orphaned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CleanupJobKind {
    TemporaryCleanup,
    OrphanCleanup,
    Manual,
}

impl CleanupJobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupJobKind::TemporaryCleanup => "temporary_cleanup",
            CleanupJobKind::OrphanCleanup => "orphan_cleanup",
            CleanupJobKind::Manual => "manual",
        }
    }
}

impl fmt::Display for CleanupJobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// A reclamation run to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupRequest {
    Temporary { max_age: Duration },
    Orphaned { grace_period: Duration },
    Manual { ids: Vec<i32> },
}

impl CleanupRequest {
    pub fn kind(&self) -> CleanupJobKind {
        match self {
            CleanupRequest::Temporary { .. } => CleanupJobKind::TemporaryCleanup,
            CleanupRequest::Orphaned { .. } => CleanupJobKind::OrphanCleanup,
            CleanupRequest::Manual { .. } => CleanupJobKind::Manual,
        }
    }

    pub fn parameters(&self) -> Value {
        match self {
            CleanupRequest::Temporary { max_age } => {
                serde_json::json!({ "max_age_secs": max_age.as_secs() })
            }
            CleanupRequest::Orphaned { grace_period } => {
                serde_json::json!({ "grace_period_secs": grace_period.as_secs() })
            }
            CleanupRequest::Manual { ids } => serde_json::json!({ "ids": ids }),
        }
    }
}

/// Outcome of one reclamation run. `files_failed > 0` is a partial batch
/// failure: the successfully processed items stay deleted.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CleanupResult {
    pub job_id: Option<i32>,
    pub status: Option<JobStatus>,
    pub files_processed: u32,
    pub files_deleted: u32,
    pub files_failed: u32,
    pub files_skipped: u32,
    pub deleted_ids: Vec<i32>,
    pub errors: Vec<String>,
}

impl CleanupResult {
    pub fn is_partial_failure(&self) -> bool {
        self.files_failed > 0
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogFilter {
    pub asset_id: Option<i32>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl AuditLogFilter {
    pub const MAX_PER_PAGE: u64 = 200;

    /// 1-based.
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(50).clamp(1, Self::MAX_PER_PAGE)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogPage {
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<crate::entities::asset_audit_logs::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssetStatistics {
    pub total_assets: u64,
    pub temporary_assets: u64,
    pub orphaned_assets: u64,
    pub deleted_assets: u64,
    pub active_references: u64,
    pub total_bytes: i64,
    pub assets_by_media_kind: BTreeMap<String, i64>,
    pub jobs_by_status: BTreeMap<String, i64>,
    #[schema(value_type = Option<Object>)]
    pub last_job: Option<cleanup_jobs::Model>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_filter_paging_bounds() {
        let filter = AuditLogFilter {
            page: Some(0),
            per_page: Some(10_000),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), AuditLogFilter::MAX_PER_PAGE);
        assert_eq!(AuditLogFilter::default().per_page(), 50);
    }

    #[test]
    fn test_descriptor_validation() {
        let mut descriptor = AssetDescriptor {
            public_id: "products/1.png".to_string(),
            url: "https://cdn.example.com/products/1.png".to_string(),
            name: "1.png".to_string(),
            media_kind: "image".to_string(),
            byte_size: 10,
            ..Default::default()
        };
        assert!(descriptor.validate().is_ok());

        descriptor.byte_size = 0;
        assert!(descriptor.validate().is_err());

        descriptor.byte_size = 10;
        descriptor.url = "relative/path.png".to_string();
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!("failed".parse::<JobStatus>(), Ok(JobStatus::Failed));
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
