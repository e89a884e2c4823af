use chrono::Utc;
use sea_orm::Set;
use serde_json::{Value, json};
use validator::Validate;

use super::references::reference_model;
use super::{AssetDescriptor, LifecycleError, LifecycleResult, LifecycleService};
use crate::entities::assets;
use crate::services::audit::{AuditAction, AuditEntry};
use crate::services::events::{FileEvent, FileEventKind};

impl LifecycleService {
    /// Records a confirmed upload.
    ///
    /// Without an `initial_reference` the asset starts out temporary and is
    /// reclaimed by the temporary sweep unless something adopts it in time.
    /// With one, the asset and its reference are committed together, so a
    /// failed call leaves nothing behind and can be retried as is.
    pub async fn register_asset(&self, descriptor: AssetDescriptor) -> LifecycleResult<assets::Model> {
        descriptor.validate()?;

        if let Some(ref mime_type) = descriptor.mime_type {
            mime_type
                .parse::<mime::Mime>()
                .map_err(|e| LifecycleError::Validation(format!("invalid mime_type '{}': {}", mime_type, e)))?;
        }

        if let Some(ref target) = descriptor.initial_reference {
            validate_target(&target.entity_type, &target.entity_id)?;
        }

        if self.repo.public_id_taken(&descriptor.public_id).await? {
            return Err(LifecycleError::Conflict(format!(
                "asset with public id '{}' already exists",
                descriptor.public_id
            )));
        }

        let now = Utc::now();
        let model = assets::ActiveModel {
            public_id: Set(descriptor.public_id.clone()),
            url: Set(descriptor.url.clone()),
            name: Set(descriptor.name.clone()),
            media_kind: Set(descriptor.media_kind.clone()),
            byte_size: Set(descriptor.byte_size),
            folder: Set(descriptor.folder.clone()),
            mime_type: Set(descriptor.mime_type.clone()),
            uploader_id: Set(descriptor.uploader_id.clone()),
            tags: Set(json!(descriptor.tags)),
            metadata: Set(Value::Object(descriptor.metadata.clone())),
            // An active reference settles both flags the way a recompute would.
            is_temporary: Set(descriptor.initial_reference.is_none()
                && descriptor.temporary.unwrap_or(true)),
            is_orphaned: Set(false),
            marked_for_deletion_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            deleted_at: Set(None),
            ..Default::default()
        };

        let (asset, reference) = match descriptor.initial_reference {
            Some(ref target) => {
                let (asset, reference) = self
                    .repo
                    .insert_asset_with_reference(
                        model,
                        reference_model(0, target, descriptor.uploader_id.as_deref()),
                    )
                    .await
                    .map_err(|e| LifecycleError::from_db(e, "register asset"))?;
                (asset, Some((target, reference)))
            }
            None => {
                let asset = self
                    .repo
                    .insert_asset(model)
                    .await
                    .map_err(|e| LifecycleError::from_db(e, "register asset"))?;
                (asset, None)
            }
        };

        tracing::info!(
            "Registered asset {} (public_id={}, {} bytes, temporary={})",
            asset.id,
            asset.public_id,
            asset.byte_size,
            asset.is_temporary
        );

        self.audit
            .record(
                AuditEntry::new(AuditAction::Upload)
                    .asset(asset.id)
                    .actor(asset.uploader_id.as_deref())
                    .details(json!({
                        "public_id": asset.public_id,
                        "media_kind": asset.media_kind,
                        "byte_size": asset.byte_size,
                        "folder": asset.folder,
                    })),
            )
            .await;

        self.emit(
            FileEvent::new(FileEventKind::Upload, &asset, AuditAction::Upload.as_str())
                .with_user(asset.uploader_id.as_deref())
                .with_meta("media_kind", asset.media_kind.clone())
                .with_meta("byte_size", asset.byte_size),
        );

        if let Some((target, reference)) = reference {
            self.announce_reference(&asset, target, &reference, 0, descriptor.uploader_id.as_deref())
                .await;
        }

        Ok(asset)
    }

    pub async fn get_asset(&self, asset_id: i32) -> LifecycleResult<assets::Model> {
        self.repo
            .find_live_asset(asset_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("asset {}", asset_id)))
    }

    pub async fn get_asset_by_public_id(&self, public_id: &str) -> LifecycleResult<assets::Model> {
        self.repo
            .find_live_asset_by_public_id(public_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(format!("asset with public id '{}'", public_id)))
    }

    /// The store reports the object as gone: retire the row without
    /// touching the store again.
    pub async fn handle_external_deletion(
        &self,
        public_id: &str,
        actor_id: Option<&str>,
    ) -> LifecycleResult<assets::Model> {
        let asset = self.get_asset_by_public_id(public_id).await?;
        let now = Utc::now();

        if self.repo.soft_delete_asset(asset.id, now).await? == 0 {
            return Err(LifecycleError::NotFound(format!("asset {}", asset.id)));
        }
        let released = self.repo.deactivate_all_references(asset.id, now).await?;

        tracing::warn!(
            "Asset {} ({}) deleted by the storage provider, released {} reference(s)",
            asset.id,
            asset.public_id,
            released
        );

        self.audit
            .record(
                AuditEntry::new(AuditAction::Delete)
                    .asset(asset.id)
                    .counts(released, 0)
                    .actor(actor_id)
                    .details(json!({ "public_id": asset.public_id, "source": "provider_webhook" })),
            )
            .await;

        self.emit(
            FileEvent::new(FileEventKind::Deleted, &asset, AuditAction::Delete.as_str())
                .with_user(actor_id)
                .with_meta("source", "provider_webhook"),
        );

        Ok(asset)
    }
}

pub(super) fn validate_target(entity_type: &str, entity_id: &str) -> LifecycleResult<()> {
    if entity_type.trim().is_empty() {
        return Err(LifecycleError::Validation("entity_type is required".to_string()));
    }
    if entity_id.trim().is_empty() {
        return Err(LifecycleError::Validation("entity_id is required".to_string()));
    }
    Ok(())
}
