use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    CleanupRequest, CleanupResult, JobStatus, LifecycleError, LifecycleResult, LifecycleService,
};
use crate::entities::{assets, cleanup_jobs};
use crate::services::audit::{AuditAction, AuditEntry};
use crate::services::events::{FileEvent, FileEventKind};

/// How one asset of a batch is reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReclaimMode {
    /// Never-adopted upload: hard-delete the row.
    Temporary,
    /// Orphan whose grace period ended at or before `marked_before`.
    Orphaned { marked_before: DateTime<Utc> },
    /// Operator request: soft-delete regardless of flags.
    Manual,
}

enum ReclaimOutcome {
    Deleted,
    Skipped(&'static str),
}

pub(super) fn cutoff(age: Duration) -> LifecycleResult<DateTime<Utc>> {
    let age = chrono::Duration::from_std(age)
        .map_err(|_| LifecycleError::Validation(format!("duration {:?} is out of range", age)))?;
    Utc::now()
        .checked_sub_signed(age)
        .ok_or_else(|| LifecycleError::Validation("duration reaches before the epoch".to_string()))
}

impl LifecycleService {
    /// Deletes temporary assets older than `max_age` that never got a reference.
    pub async fn cleanup_temporary(
        &self,
        max_age: Duration,
        cancel: &CancellationToken,
    ) -> LifecycleResult<CleanupResult> {
        self.run_cleanup(CleanupRequest::Temporary { max_age }, None, cancel)
            .await
    }

    /// Deletes orphans whose `marked_for_deletion_at` is older than `grace_period`.
    pub async fn cleanup_orphaned(
        &self,
        grace_period: Duration,
        cancel: &CancellationToken,
    ) -> LifecycleResult<CleanupResult> {
        self.run_cleanup(CleanupRequest::Orphaned { grace_period }, None, cancel)
            .await
    }

    /// Operator-triggered deletion of an explicit id set.
    pub async fn batch_cleanup_files(
        &self,
        ids: Vec<i32>,
        actor_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> LifecycleResult<CleanupResult> {
        if ids.is_empty() {
            return Err(LifecycleError::Validation("no asset ids provided".to_string()));
        }
        self.run_cleanup(CleanupRequest::Manual { ids }, actor_id, cancel)
            .await
    }

    /// Runs one reclamation job, waiting for any run already in progress.
    pub async fn run_cleanup(
        &self,
        request: CleanupRequest,
        actor_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> LifecycleResult<CleanupResult> {
        let _guard = self.lock_reclamation().await;
        let job = self.repo.create_job(request.kind(), request.parameters()).await?;
        self.execute_job(job, &request, actor_id, cancel).await
    }

    /// Like `run_cleanup`, but returns `None` instead of waiting when another
    /// run holds the reclamation lock.
    pub async fn try_run_cleanup(
        &self,
        request: CleanupRequest,
        cancel: &CancellationToken,
    ) -> LifecycleResult<Option<CleanupResult>> {
        let Some(_guard) = self.try_lock_reclamation() else {
            return Ok(None);
        };
        let job = self.repo.create_job(request.kind(), request.parameters()).await?;
        self.execute_job(job, &request, None, cancel).await.map(Some)
    }

    /// Records a pending job and runs it in the background. The returned row
    /// can be polled through `get_cleanup_job`.
    pub async fn schedule_cleanup_job(
        self: &Arc<Self>,
        request: CleanupRequest,
        actor_id: Option<String>,
    ) -> LifecycleResult<cleanup_jobs::Model> {
        if let CleanupRequest::Manual { ref ids } = request
            && ids.is_empty()
        {
            return Err(LifecycleError::Validation("no asset ids provided".to_string()));
        }

        let job = self.repo.create_job(request.kind(), request.parameters()).await?;
        tracing::info!("Scheduled {} job {}", request.kind(), job.id);

        let service = Arc::clone(self);
        let pending = job.clone();
        tokio::spawn(async move {
            let cancel = service.shutdown_token();
            let _guard = service.lock_reclamation().await;
            let job_id = pending.id;
            if let Err(e) = service
                .execute_job(pending, &request, actor_id.as_deref(), &cancel)
                .await
            {
                tracing::error!("Scheduled cleanup job {} failed: {}", job_id, e);
            }
        });

        Ok(job)
    }

    /// The assets a cleanup would touch right now, without mutating anything.
    pub async fn preview_cleanup(&self, request: &CleanupRequest) -> LifecycleResult<Vec<assets::Model>> {
        let candidates = self.candidates(request).await?;
        if matches!(request, CleanupRequest::Manual { .. }) {
            return Ok(candidates);
        }

        let mut scope = Vec::with_capacity(candidates.len());
        for asset in candidates {
            if self.repo.count_active_references(asset.id).await? == 0 {
                scope.push(asset);
            }
        }
        Ok(scope)
    }

    /// Deferred orphan check: recompute first so a reference re-added during
    /// the grace window (even one whose event was lost) keeps the asset.
    pub async fn reclaim_if_still_orphaned(
        &self,
        asset_id: i32,
        grace_period: Duration,
    ) -> LifecycleResult<bool> {
        let outcome = match self.recompute_reference_count(asset_id).await {
            Ok(outcome) => outcome,
            Err(LifecycleError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !outcome.is_orphaned {
            tracing::info!(
                "Asset {} was re-referenced during its grace period, keeping it",
                asset_id
            );
            return Ok(false);
        }

        let mode = ReclaimMode::Orphaned {
            marked_before: cutoff(grace_period)?,
        };
        match self.reclaim_one(asset_id, mode, None).await? {
            ReclaimOutcome::Deleted => Ok(true),
            ReclaimOutcome::Skipped(reason) => {
                tracing::debug!("Deferred check kept asset {}: {}", asset_id, reason);
                Ok(false)
            }
        }
    }

    /// Manual deletion of a single asset, outside any job.
    pub async fn delete_asset(&self, asset_id: i32, actor_id: Option<&str>) -> LifecycleResult<()> {
        match self.reclaim_one(asset_id, ReclaimMode::Manual, actor_id).await? {
            ReclaimOutcome::Deleted => Ok(()),
            ReclaimOutcome::Skipped(reason) => Err(LifecycleError::NotFound(format!(
                "asset {}: {}",
                asset_id, reason
            ))),
        }
    }

    pub async fn get_cleanup_job(&self, job_id: i32) -> LifecycleResult<cleanup_jobs::Model> {
        self.repo
            .find_job(job_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("cleanup job {}", job_id)))
    }

    pub async fn list_cleanup_jobs(&self, limit: u64) -> LifecycleResult<Vec<cleanup_jobs::Model>> {
        Ok(self.repo.recent_jobs(limit.clamp(1, 500)).await?)
    }

    async fn candidates(&self, request: &CleanupRequest) -> LifecycleResult<Vec<assets::Model>> {
        let limit = self.config.cleanup_batch_size;
        Ok(match request {
            CleanupRequest::Temporary { max_age } => {
                self.repo.temporary_candidates(cutoff(*max_age)?, limit).await?
            }
            CleanupRequest::Orphaned { grace_period } => {
                self.repo.orphan_candidates(cutoff(*grace_period)?, limit).await?
            }
            CleanupRequest::Manual { ids } => self.repo.find_live_assets(ids).await?,
        })
    }

    /// pending -> running -> completed | failed. Callers hold the reclamation lock.
    async fn execute_job(
        &self,
        job: cleanup_jobs::Model,
        request: &CleanupRequest,
        actor_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> LifecycleResult<CleanupResult> {
        let mode = match request {
            CleanupRequest::Temporary { .. } => ReclaimMode::Temporary,
            CleanupRequest::Orphaned { grace_period } => ReclaimMode::Orphaned {
                marked_before: cutoff(*grace_period)?,
            },
            CleanupRequest::Manual { .. } => ReclaimMode::Manual,
        };
        // Manual ids are kept as given so unknown ones are reported as failures.
        let ids: Vec<i32> = match request {
            CleanupRequest::Manual { ids } => ids.clone(),
            _ => self
                .candidates(request)
                .await?
                .into_iter()
                .map(|a| a.id)
                .collect(),
        };

        let job = self.repo.mark_job_running(job).await?;
        tracing::info!(
            "🧹 Cleanup job {} ({}) running over {} candidate(s)",
            job.id,
            job.job_type,
            ids.len()
        );

        let mut result = CleanupResult {
            job_id: Some(job.id),
            ..Default::default()
        };
        let mut cancelled = false;

        for asset_id in ids {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(
                    "Cleanup job {} cancelled after {} item(s)",
                    job.id,
                    result.files_processed
                );
                break;
            }

            result.files_processed += 1;
            match self.reclaim_one(asset_id, mode, actor_id).await {
                Ok(ReclaimOutcome::Deleted) => {
                    result.files_deleted += 1;
                    result.deleted_ids.push(asset_id);
                }
                Ok(ReclaimOutcome::Skipped(reason)) => {
                    tracing::debug!("Job {} skipped asset {}: {}", job.id, asset_id, reason);
                    result.files_skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("Job {} failed on asset {}: {}", job.id, asset_id, e);
                    result.files_failed += 1;
                    result.errors.push(format!("asset {}: {}", asset_id, e));
                }
            }
        }

        let status = if result.files_failed > 0 || cancelled {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        let error_message = if cancelled {
            Some("cancelled".to_string())
        } else if result.errors.is_empty() {
            None
        } else {
            Some(result.errors.join("; "))
        };

        let job_id = job.id;
        if let Err(e) = self
            .repo
            .finish_job(
                job,
                status,
                (result.files_processed, result.files_deleted, result.files_failed),
                error_message,
            )
            .await
        {
            // Items are already gone; the row only lags behind.
            tracing::error!("Failed to finalize cleanup job {}: {}", job_id, e);
        }
        result.status = Some(status);

        tracing::info!(
            "✅ Cleanup job {} {}: processed={}, deleted={}, failed={}, skipped={}",
            job_id,
            status,
            result.files_processed,
            result.files_deleted,
            result.files_failed,
            result.files_skipped
        );

        Ok(result)
    }

    /// Object-store delete first, then the row. A failed store delete leaves
    /// the row untouched; a store object without a row is recoverable, a row
    /// without its object is not.
    async fn reclaim_one(
        &self,
        asset_id: i32,
        mode: ReclaimMode,
        actor_id: Option<&str>,
    ) -> LifecycleResult<ReclaimOutcome> {
        let asset = match self.repo.find_live_asset(asset_id).await? {
            Some(asset) => asset,
            None if mode == ReclaimMode::Manual => {
                return Err(LifecycleError::NotFound(format!("asset {}", asset_id)));
            }
            None => return Ok(ReclaimOutcome::Skipped("already deleted")),
        };

        let active = self.repo.count_active_references(asset_id).await?;
        match mode {
            ReclaimMode::Temporary => {
                if !asset.is_temporary {
                    return Ok(ReclaimOutcome::Skipped("no longer temporary"));
                }
                if active > 0 {
                    self.recompute_reference_count(asset_id).await?;
                    return Ok(ReclaimOutcome::Skipped("has active references"));
                }
            }
            ReclaimMode::Orphaned { marked_before } => {
                if !asset.is_orphaned {
                    return Ok(ReclaimOutcome::Skipped("no longer orphaned"));
                }
                if active > 0 {
                    self.recompute_reference_count(asset_id).await?;
                    return Ok(ReclaimOutcome::Skipped("has active references"));
                }
                if asset.marked_for_deletion_at.is_none_or(|at| at > marked_before) {
                    return Ok(ReclaimOutcome::Skipped("grace period not elapsed"));
                }
            }
            ReclaimMode::Manual => {}
        }

        self.storage
            .delete_file(&asset.public_id)
            .await
            .map_err(|e| LifecycleError::StorageDelete(format!("{}: {}", asset.public_id, e)))?;

        let now = Utc::now();
        let (removed, action, kind) = match mode {
            ReclaimMode::Temporary => (
                self.repo.hard_delete_unreferenced_temporary(asset_id).await?,
                AuditAction::Cleanup,
                FileEventKind::Cleanup,
            ),
            ReclaimMode::Orphaned { .. } => (
                self.repo.soft_delete_unreferenced_orphan(asset_id, now).await?,
                AuditAction::Delete,
                FileEventKind::Deleted,
            ),
            ReclaimMode::Manual => {
                let removed = self.repo.soft_delete_asset(asset_id, now).await?;
                if removed > 0 && active > 0 {
                    self.repo.deactivate_all_references(asset_id, now).await?;
                }
                (removed, AuditAction::Delete, FileEventKind::Deleted)
            }
        };

        if removed == 0 {
            tracing::warn!(
                "Asset {} ({}) changed while its object was being deleted; the row was kept",
                asset_id,
                asset.public_id
            );
            if mode == ReclaimMode::Manual || self.repo.find_live_asset(asset_id).await?.is_none() {
                return Ok(ReclaimOutcome::Skipped("already deleted"));
            }
            self.recompute_reference_count(asset_id).await?;
            return Err(LifecycleError::Conflict(format!(
                "asset {} gained a reference after its object '{}' was deleted",
                asset_id, asset.public_id
            )));
        }

        tracing::info!(
            "Reclaimed asset {} ({}) from store and database",
            asset_id,
            asset.public_id
        );

        self.audit
            .record(
                AuditEntry::new(action)
                    .asset(asset_id)
                    .counts(active, 0)
                    .actor(actor_id)
                    .details(json!({
                        "public_id": asset.public_id,
                        "byte_size": asset.byte_size,
                        "mode": mode_name(mode),
                    })),
            )
            .await;

        self.emit(
            FileEvent::new(kind, &asset, action.as_str())
                .with_user(actor_id)
                .with_meta("mode", mode_name(mode)),
        );

        Ok(ReclaimOutcome::Deleted)
    }
}

fn mode_name(mode: ReclaimMode) -> &'static str {
    match mode {
        ReclaimMode::Temporary => "temporary",
        ReclaimMode::Orphaned { .. } => "orphaned",
        ReclaimMode::Manual => "manual",
    }
}
