use chrono::Utc;
use sea_orm::Set;
use serde_json::json;

use super::registration::validate_target;
use super::{LifecycleError, LifecycleResult, LifecycleService, ReferenceCountOutcome, ReferenceTarget};
use crate::entities::{asset_references, assets};
use crate::services::audit::{AuditAction, AuditEntry};
use crate::services::events::{FileEvent, FileEventKind};

const DEFAULT_REFERENCE_KIND: &str = "primary";

impl LifecycleService {
    /// Links an asset to a business entity.
    ///
    /// Flags are left alone here; `recompute_reference_count` derives them,
    /// either from the `reference_added` event or when the caller needs it now.
    pub async fn add_reference(
        &self,
        asset_id: i32,
        target: &ReferenceTarget,
        actor_id: Option<&str>,
    ) -> LifecycleResult<asset_references::Model> {
        validate_target(&target.entity_type, &target.entity_id)?;

        let asset = self.get_asset(asset_id).await?;

        if let Some(existing) = self
            .repo
            .find_active_slot(
                asset_id,
                &target.entity_type,
                &target.entity_id,
                target.field_name.as_deref(),
            )
            .await?
        {
            tracing::debug!(
                "Reference {} already links asset {} to {}:{}",
                existing.id,
                asset_id,
                target.entity_type,
                target.entity_id
            );
            return Ok(existing);
        }

        let old_count = self.repo.count_active_references(asset_id).await?;

        let reference = self
            .repo
            .insert_reference(reference_model(asset_id, target, actor_id))
            .await?;
        self.announce_reference(&asset, target, &reference, old_count, actor_id)
            .await;

        Ok(reference)
    }

    /// Logs, audits and publishes a freshly inserted reference.
    pub(super) async fn announce_reference(
        &self,
        asset: &assets::Model,
        target: &ReferenceTarget,
        reference: &asset_references::Model,
        old_count: u64,
        actor_id: Option<&str>,
    ) {
        tracing::info!(
            "Asset {} referenced by {}:{} (field={:?})",
            asset.id,
            target.entity_type,
            target.entity_id,
            target.field_name
        );

        self.audit
            .record(
                AuditEntry::new(AuditAction::ReferenceAdd)
                    .asset(asset.id)
                    .entity(&target.entity_type, &target.entity_id)
                    .counts(old_count, old_count + 1)
                    .actor(actor_id)
                    .details(json!({
                        "reference_id": reference.id,
                        "field_name": reference.field_name,
                        "reference_kind": reference.reference_kind,
                    })),
            )
            .await;

        let mut event = FileEvent::new(
            FileEventKind::ReferenceAdded,
            asset,
            AuditAction::ReferenceAdd.as_str(),
        )
        .with_entity(&target.entity_type, &target.entity_id)
        .with_user(actor_id)
        .with_meta("reference_kind", reference.reference_kind.clone());
        if let Some(ref field) = reference.field_name {
            event = event.with_meta("field_name", field.clone());
        }
        self.emit(event);
    }

    /// Soft-deletes every active reference from `entity_type:entity_id` to
    /// the asset. Returns how many rows were released.
    pub async fn remove_reference(
        &self,
        asset_id: i32,
        entity_type: &str,
        entity_id: &str,
        actor_id: Option<&str>,
    ) -> LifecycleResult<u64> {
        validate_target(entity_type, entity_id)?;

        let asset = self
            .repo
            .find_asset_any_state(asset_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("asset {}", asset_id)))?;

        let old_count = self.repo.count_active_references(asset_id).await?;
        let released = self
            .repo
            .deactivate_references(asset_id, entity_type, entity_id, Utc::now())
            .await?;

        if released == 0 {
            return Err(LifecycleError::NotFound(format!(
                "no active reference from {}:{} to asset {}",
                entity_type, entity_id, asset_id
            )));
        }

        tracing::info!(
            "Released {} reference(s) from {}:{} to asset {}",
            released,
            entity_type,
            entity_id,
            asset_id
        );

        self.record_release(&asset, entity_type, entity_id, old_count, released, actor_id)
            .await;

        Ok(released)
    }

    /// Entity teardown: releases everything the entity references. Returns
    /// the ids of the affected assets.
    pub async fn release_entity_references(
        &self,
        entity_type: &str,
        entity_id: &str,
        actor_id: Option<&str>,
    ) -> LifecycleResult<Vec<i32>> {
        validate_target(entity_type, entity_id)?;

        let mut asset_ids: Vec<i32> = self
            .repo
            .active_references_for_entity(entity_type, entity_id)
            .await?
            .into_iter()
            .map(|r| r.asset_id)
            .collect();
        asset_ids.sort_unstable();
        asset_ids.dedup();

        let mut affected = Vec::with_capacity(asset_ids.len());
        for asset_id in asset_ids {
            let Some(asset) = self.repo.find_asset_any_state(asset_id).await? else {
                continue;
            };
            let old_count = self.repo.count_active_references(asset_id).await?;
            let released = self
                .repo
                .deactivate_references(asset_id, entity_type, entity_id, Utc::now())
                .await?;
            if released > 0 {
                self.record_release(&asset, entity_type, entity_id, old_count, released, actor_id)
                    .await;
                affected.push(asset_id);
            }
        }

        tracing::info!(
            "Released references of {}:{} on {} asset(s)",
            entity_type,
            entity_id,
            affected.len()
        );

        Ok(affected)
    }

    async fn record_release(
        &self,
        asset: &assets::Model,
        entity_type: &str,
        entity_id: &str,
        old_count: u64,
        released: u64,
        actor_id: Option<&str>,
    ) {
        self.audit
            .record(
                AuditEntry::new(AuditAction::ReferenceRemove)
                    .asset(asset.id)
                    .entity(entity_type, entity_id)
                    .counts(old_count, old_count.saturating_sub(released))
                    .actor(actor_id)
                    .details(json!({ "released": released })),
            )
            .await;

        self.emit(
            FileEvent::new(
                FileEventKind::ReferenceRemoved,
                asset,
                AuditAction::ReferenceRemove.as_str(),
            )
            .with_entity(entity_type, entity_id)
            .with_user(actor_id)
            .with_meta("released", released),
        );
    }

    pub async fn get_references_for(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> LifecycleResult<Vec<asset_references::Model>> {
        Ok(self
            .repo
            .active_references_for_entity(entity_type, entity_id)
            .await?)
    }

    pub async fn get_references_for_asset(
        &self,
        asset_id: i32,
    ) -> LifecycleResult<Vec<asset_references::Model>> {
        Ok(self.repo.active_references_for_asset(asset_id).await?)
    }

    /// Derives `is_temporary` / `is_orphaned` from a fresh count of active
    /// references.
    ///
    /// Nothing is incremented or decremented, so duplicate, concurrent or
    /// reordered invocations converge on the same state. An asset still
    /// waiting for its first reference stays temporary rather than orphaned.
    pub async fn recompute_reference_count(
        &self,
        asset_id: i32,
    ) -> LifecycleResult<ReferenceCountOutcome> {
        let asset = self.get_asset(asset_id).await?;
        let count = self.repo.count_active_references(asset_id).await?;
        let now = Utc::now();

        if count > 0 {
            if self.repo.flag_referenced(asset_id, now).await? {
                tracing::info!(
                    "Asset {} has {} active reference(s), flags cleared",
                    asset_id,
                    count
                );
            }
            return Ok(ReferenceCountOutcome {
                asset_id,
                active_references: count,
                is_temporary: false,
                is_orphaned: false,
                newly_orphaned: false,
            });
        }

        if asset.is_temporary {
            return Ok(ReferenceCountOutcome {
                asset_id,
                active_references: 0,
                is_temporary: true,
                is_orphaned: false,
                newly_orphaned: false,
            });
        }

        let newly_orphaned = self.repo.flag_orphaned(asset_id, now).await?;
        if newly_orphaned {
            self.on_orphaned(&asset, now).await;
        }

        Ok(ReferenceCountOutcome {
            asset_id,
            active_references: 0,
            is_temporary: false,
            is_orphaned: true,
            newly_orphaned,
        })
    }

    /// Sweep for confirmed assets that lost their last reference without the
    /// flag being set (e.g. a lost `reference_removed` event).
    pub async fn mark_orphaned_assets(&self) -> LifecycleResult<u64> {
        let candidates = self
            .repo
            .unflagged_orphans(self.config.cleanup_batch_size)
            .await?;

        let mut marked = 0;
        for asset in candidates {
            // A reference may have landed since the candidate query ran.
            if self.repo.count_active_references(asset.id).await? > 0 {
                continue;
            }
            let now = Utc::now();
            if self.repo.flag_orphaned(asset.id, now).await? {
                self.on_orphaned(&asset, now).await;
                marked += 1;
            }
        }

        if marked > 0 {
            tracing::info!("Marked {} asset(s) as orphaned", marked);
        }
        Ok(marked)
    }

    async fn on_orphaned(&self, asset: &assets::Model, marked_at: chrono::DateTime<Utc>) {
        tracing::info!(
            "Asset {} ({}) is orphaned, eligible for deletion after the grace period",
            asset.id,
            asset.public_id
        );

        self.audit
            .record(
                AuditEntry::new(AuditAction::MarkOrphaned)
                    .asset(asset.id)
                    .details(json!({
                        "public_id": asset.public_id,
                        "marked_for_deletion_at": marked_at,
                    })),
            )
            .await;

        self.emit(
            FileEvent::new(
                FileEventKind::Orphaned,
                asset,
                AuditAction::MarkOrphaned.as_str(),
            )
            .with_meta("marked_for_deletion_at", marked_at.to_rfc3339()),
        );
    }
}

/// Unsaved row for a new active reference; `asset_id` may be overwritten by
/// the caller when the asset is inserted alongside it.
pub(super) fn reference_model(
    asset_id: i32,
    target: &ReferenceTarget,
    actor_id: Option<&str>,
) -> asset_references::ActiveModel {
    asset_references::ActiveModel {
        asset_id: Set(asset_id),
        entity_type: Set(target.entity_type.clone()),
        entity_id: Set(target.entity_id.clone()),
        field_name: Set(target.field_name.clone()),
        reference_kind: Set(target
            .reference_kind
            .clone()
            .unwrap_or_else(|| DEFAULT_REFERENCE_KIND.to_string())),
        creator_id: Set(actor_id.map(str::to_string)),
        active: Set(true),
        created_at: Set(Utc::now()),
        deleted_at: Set(None),
        ..Default::default()
    }
}
