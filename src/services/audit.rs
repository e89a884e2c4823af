use crate::entities::asset_audit_logs;
use crate::services::repository::AssetRepository;
use chrono::Utc;
use sea_orm::{DbErr, Set};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Upload,
    ReferenceAdd,
    ReferenceRemove,
    MarkOrphaned,
    Cleanup,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Upload => "upload",
            AuditAction::ReferenceAdd => "reference_add",
            AuditAction::ReferenceRemove => "reference_remove",
            AuditAction::MarkOrphaned => "mark_orphaned",
            AuditAction::Cleanup => "cleanup",
            AuditAction::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One action against an asset or an entity-asset link.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub asset_id: Option<i32>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub old_count: Option<i64>,
    pub new_count: Option<i64>,
    pub details: Value,
    pub actor_id: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            asset_id: None,
            entity_type: None,
            entity_id: None,
            old_count: None,
            new_count: None,
            details: Value::Object(Default::default()),
            actor_id: None,
        }
    }

    pub fn asset(mut self, asset_id: i32) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    pub fn entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn counts(mut self, old_count: u64, new_count: u64) -> Self {
        self.old_count = Some(old_count as i64);
        self.new_count = Some(new_count as i64);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn actor(mut self, actor_id: Option<&str>) -> Self {
        self.actor_id = actor_id.map(str::to_string);
        self
    }
}

#[derive(Clone)]
pub struct AuditService {
    repo: AssetRepository,
}

impl AuditService {
    pub fn new(repo: AssetRepository) -> Self {
        Self { repo }
    }

    /// Writes one entry and reports persistence failures to the caller.
    pub async fn log_action(&self, entry: AuditEntry) -> Result<asset_audit_logs::Model, DbErr> {
        info!(
            target: "audit",
            action = %entry.action,
            asset_id = ?entry.asset_id,
            entity_type = ?entry.entity_type,
            entity_id = ?entry.entity_id,
            actor_id = ?entry.actor_id,
            "Audit Event Occurred"
        );

        let log = asset_audit_logs::ActiveModel {
            asset_id: Set(entry.asset_id),
            action: Set(entry.action.as_str().to_string()),
            entity_type: Set(entry.entity_type),
            entity_id: Set(entry.entity_id),
            old_count: Set(entry.old_count),
            new_count: Set(entry.new_count),
            details: Set(entry.details),
            actor_id: Set(entry.actor_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        self.repo.insert_audit(log).await
    }

    /// Same as `log_action`, but a failed write is only reported to the
    /// process log so it never fails the state change it describes.
    pub async fn record(&self, entry: AuditEntry) {
        let action = entry.action;
        let asset_id = entry.asset_id;
        if let Err(e) = self.log_action(entry).await {
            error!(
                "Failed to persist audit log ({} on asset {:?}): {}",
                action, asset_id, e
            );
        }
    }
}
