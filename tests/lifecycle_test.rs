mod common;

use asset_lifecycle::services::audit::{AuditAction, AuditEntry};
use asset_lifecycle::services::lifecycle::{
    AuditLogFilter, CleanupRequest, JobStatus, LifecycleError, ReferenceTarget,
};
use common::{descriptor, setup};
use sea_orm::ConnectionTrait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_register_then_lookup_by_public_id() {
    let ctx = setup().await;
    let registered = ctx.upload("products/42/thumb.png").await;

    let found = ctx
        .service
        .get_asset_by_public_id("products/42/thumb.png")
        .await
        .unwrap();

    assert_eq!(found.id, registered.id);
    assert_eq!(found.public_id, "products/42/thumb.png");
    assert_eq!(found.url, "https://cdn.test/assets/products/42/thumb.png");
    assert!(found.is_temporary);
    assert!(!found.is_orphaned);
    assert!(found.marked_for_deletion_at.is_none());
}

#[tokio::test]
async fn test_duplicate_public_id_is_a_conflict() {
    let ctx = setup().await;
    ctx.upload("dup.png").await;

    let err = ctx
        .service
        .register_asset(descriptor("dup.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_invalid_descriptor_is_rejected() {
    let ctx = setup().await;

    let mut bad = descriptor("bad.png");
    bad.byte_size = 0;
    assert!(matches!(
        ctx.service.register_asset(bad).await,
        Err(LifecycleError::Validation(_))
    ));

    let mut bad_mime = descriptor("bad-mime.png");
    bad_mime.mime_type = Some("not a mime".to_string());
    assert!(matches!(
        ctx.service.register_asset(bad_mime).await,
        Err(LifecycleError::Validation(_))
    ));
}

#[tokio::test]
async fn test_register_with_initial_reference_is_confirmed() {
    let ctx = setup().await;

    let mut desc = descriptor("receipts/7.pdf");
    desc.initial_reference = Some(ReferenceTarget::new("receipt", "7").field("scan"));
    let asset = ctx.service.register_asset(desc).await.unwrap();

    assert!(!asset.is_temporary);
    assert!(!asset.is_orphaned);
    let refs = ctx.service.get_references_for_asset(asset.id).await.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].entity_type, "receipt");
}

#[tokio::test]
async fn test_register_with_failing_reference_leaves_nothing_and_retries() {
    let ctx = setup().await;
    let mut desc = descriptor("receipts/8.pdf");
    desc.initial_reference = Some(ReferenceTarget::new("receipt", "8"));

    // Reference inserts fail while the table is renamed away.
    ctx.db
        .execute_unprepared("ALTER TABLE asset_references RENAME TO asset_references_offline")
        .await
        .unwrap();
    let err = ctx.service.register_asset(desc.clone()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Persistence(_)), "got {:?}", err);
    assert!(matches!(
        ctx.service.get_asset_by_public_id("receipts/8.pdf").await,
        Err(LifecycleError::NotFound(_))
    ));

    ctx.db
        .execute_unprepared("ALTER TABLE asset_references_offline RENAME TO asset_references")
        .await
        .unwrap();
    let asset = ctx.service.register_asset(desc).await.unwrap();
    assert!(!asset.is_temporary);
    assert!(!asset.is_orphaned);
    assert_eq!(ctx.service.get_references_for_asset(asset.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_orphan_lifecycle_end_to_end() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();
    let a1 = ctx.upload("products/42/thumb.png").await;

    let target = ReferenceTarget::new("product", "42").field("thumb");
    ctx.service
        .add_reference(a1.id, &target, Some("user-1"))
        .await
        .unwrap();
    let outcome = ctx.service.recompute_reference_count(a1.id).await.unwrap();
    assert_eq!(outcome.active_references, 1);
    assert!(!outcome.is_temporary);
    assert!(!outcome.is_orphaned);

    ctx.service
        .remove_reference(a1.id, "product", "42", Some("user-1"))
        .await
        .unwrap();
    let outcome = ctx.service.recompute_reference_count(a1.id).await.unwrap();
    assert!(outcome.is_orphaned);
    assert!(outcome.newly_orphaned);
    let asset = ctx.service.get_asset(a1.id).await.unwrap();
    assert!(asset.is_orphaned);
    assert!(asset.marked_for_deletion_at.is_some());

    let early = ctx
        .service
        .cleanup_orphaned(72 * HOUR, &cancel)
        .await
        .unwrap();
    assert_eq!(early.files_deleted, 0);
    assert!(ctx.service.get_asset(a1.id).await.is_ok());

    let result = ctx
        .service
        .cleanup_orphaned(Duration::ZERO, &cancel)
        .await
        .unwrap();
    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.deleted_ids, vec![a1.id]);
    assert_eq!(result.status, Some(JobStatus::Completed));
    assert_eq!(ctx.storage.deleted(), vec!["products/42/thumb.png".to_string()]);

    let page = ctx
        .service
        .get_audit_logs(&AuditLogFilter {
            asset_id: Some(a1.id),
            action: Some("delete".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    assert!(matches!(
        ctx.service.get_asset(a1.id).await,
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        ctx.service.get_asset_by_public_id("products/42/thumb.png").await,
        Err(LifecycleError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let ctx = setup().await;
    let asset = ctx.upload("idem.png").await;
    ctx.service
        .add_reference(asset.id, &ReferenceTarget::new("invoice", "9"), None)
        .await
        .unwrap();
    ctx.service
        .remove_reference(asset.id, "invoice", "9", None)
        .await
        .unwrap();

    let first = ctx.service.recompute_reference_count(asset.id).await.unwrap();
    let after_first = ctx.service.get_asset(asset.id).await.unwrap();
    for _ in 0..4 {
        ctx.service.recompute_reference_count(asset.id).await.unwrap();
    }
    let last = ctx.service.recompute_reference_count(asset.id).await.unwrap();
    let after_last = ctx.service.get_asset(asset.id).await.unwrap();

    assert!(first.newly_orphaned);
    assert!(!last.newly_orphaned);
    assert_eq!(first.is_orphaned, last.is_orphaned);
    assert_eq!(
        after_first.marked_for_deletion_at,
        after_last.marked_for_deletion_at
    );

    // Exactly one mark_orphaned entry despite repeated recomputes.
    let page = ctx
        .service
        .get_audit_logs(&AuditLogFilter {
            asset_id: Some(asset.id),
            action: Some(AuditAction::MarkOrphaned.as_str().to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn test_orphan_flag_tracks_references_in_any_order() {
    let ctx = setup().await;
    let asset = ctx.upload("order.png").await;
    let a = ReferenceTarget::new("product", "1");
    let b = ReferenceTarget::new("product", "2");

    ctx.service.add_reference(asset.id, &a, None).await.unwrap();
    ctx.service.add_reference(asset.id, &b, None).await.unwrap();
    ctx.service.remove_reference(asset.id, "product", "1", None).await.unwrap();
    let outcome = ctx.service.recompute_reference_count(asset.id).await.unwrap();
    assert_eq!(outcome.active_references, 1);
    assert!(!outcome.is_orphaned);

    ctx.service.remove_reference(asset.id, "product", "2", None).await.unwrap();
    assert!(ctx.service.recompute_reference_count(asset.id).await.unwrap().is_orphaned);

    ctx.service.add_reference(asset.id, &a, None).await.unwrap();
    let outcome = ctx.service.recompute_reference_count(asset.id).await.unwrap();
    assert!(!outcome.is_orphaned);
    assert!(
        ctx.service
            .get_asset(asset.id)
            .await
            .unwrap()
            .marked_for_deletion_at
            .is_none()
    );
}

#[tokio::test]
async fn test_add_reference_is_idempotent_per_slot() {
    let ctx = setup().await;
    let asset = ctx.upload("slot.png").await;
    let target = ReferenceTarget::new("product", "5").field("gallery");

    let first = ctx.service.add_reference(asset.id, &target, None).await.unwrap();
    let second = ctx.service.add_reference(asset.id, &target, None).await.unwrap();
    assert_eq!(first.id, second.id);

    let other_field = ReferenceTarget::new("product", "5").field("hero");
    ctx.service.add_reference(asset.id, &other_field, None).await.unwrap();
    assert_eq!(
        ctx.service.get_references_for("product", "5").await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_remove_missing_reference_is_not_found() {
    let ctx = setup().await;
    let asset = ctx.upload("none.png").await;
    assert!(matches!(
        ctx.service.remove_reference(asset.id, "product", "404", None).await,
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        ctx.service
            .add_reference(9999, &ReferenceTarget::new("product", "1"), None)
            .await,
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        ctx.service
            .add_reference(asset.id, &ReferenceTarget::new("", "1"), None)
            .await,
        Err(LifecycleError::Validation(_))
    ));
}

#[tokio::test]
async fn test_temporary_without_references_is_not_orphaned() {
    let ctx = setup().await;
    let asset = ctx.upload("pending.png").await;

    let outcome = ctx.service.recompute_reference_count(asset.id).await.unwrap();
    assert!(outcome.is_temporary);
    assert!(!outcome.is_orphaned);
    assert_eq!(ctx.service.mark_orphaned_assets().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cleanup_temporary_spares_referenced_and_recent_assets() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();

    let stale = ctx.upload("tmp/stale.png").await;
    let recent = ctx.upload("tmp/recent.png").await;
    let adopted = ctx.upload("tmp/adopted.png").await;
    ctx.age_asset(stale.id, 48).await;
    ctx.age_asset(adopted.id, 48).await;

    // Referenced but not yet recomputed: the flag is stale on purpose.
    ctx.service
        .add_reference(adopted.id, &ReferenceTarget::new("product", "1"), None)
        .await
        .unwrap();

    let result = ctx
        .service
        .cleanup_temporary(24 * HOUR, &cancel)
        .await
        .unwrap();

    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.deleted_ids, vec![stale.id]);
    assert_eq!(result.files_skipped, 1);
    assert!(ctx.raw_asset(stale.id).await.is_none(), "temporary assets are hard-deleted");
    assert!(ctx.service.get_asset(recent.id).await.is_ok());

    let adopted = ctx.service.get_asset(adopted.id).await.unwrap();
    assert!(!adopted.is_temporary, "skip path recomputes the flags");

    let audit = ctx
        .service
        .get_audit_logs(&AuditLogFilter {
            action: Some("cleanup".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(audit.total, 1);
}

#[tokio::test]
async fn test_cleanup_orphaned_respects_grace_period() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();

    let mut ids = Vec::new();
    for name in ["o/old.png", "o/fresh.png"] {
        let asset = ctx.upload(name).await;
        ctx.service
            .add_reference(asset.id, &ReferenceTarget::new("post", "1"), None)
            .await
            .unwrap();
        ctx.service.recompute_reference_count(asset.id).await.unwrap();
        ctx.service.remove_reference(asset.id, "post", "1", None).await.unwrap();
        ctx.service.recompute_reference_count(asset.id).await.unwrap();
        ids.push(asset.id);
    }
    ctx.age_orphan_mark(ids[0], 100).await;

    let result = ctx
        .service
        .cleanup_orphaned(72 * HOUR, &cancel)
        .await
        .unwrap();
    assert_eq!(result.deleted_ids, vec![ids[0]]);

    let old = ctx.raw_asset(ids[0]).await.unwrap();
    assert!(old.deleted_at.is_some(), "orphans are soft-deleted");
    assert!(ctx.service.get_asset(ids[1]).await.is_ok());
}

#[tokio::test]
async fn test_batch_cleanup_reports_partial_failure() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();

    let a = ctx.upload("batch/a.png").await;
    let b = ctx.upload("batch/b.png").await;
    let c = ctx.upload("batch/c.png").await;
    ctx.storage.fail_deletes_for("batch/b.png");

    let result = ctx
        .service
        .batch_cleanup_files(vec![a.id, b.id, c.id], Some("admin"), &cancel)
        .await
        .unwrap();

    assert_eq!(result.files_processed, 3);
    assert_eq!(result.files_deleted, 2);
    assert_eq!(result.files_failed, 1);
    assert!(result.is_partial_failure());
    assert_eq!(result.status, Some(JobStatus::Failed));
    assert_eq!(result.errors.len(), 1);

    let job = ctx
        .service
        .get_cleanup_job(result.job_id.unwrap())
        .await
        .unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(job.job_type, "manual");
    assert_eq!((job.files_processed, job.files_deleted, job.files_failed), (3, 2, 1));
    assert!(job.completed_at.is_some());

    assert!(ctx.service.get_asset(a.id).await.is_err());
    assert!(ctx.service.get_asset(c.id).await.is_err());
    // The failed item keeps both its row and its object.
    assert!(ctx.service.get_asset(b.id).await.is_ok());
    assert!(ctx.storage.contains("batch/b.png"));
}

#[tokio::test]
async fn test_batch_cleanup_counts_unknown_ids_as_failures() {
    let ctx = setup().await;
    let a = ctx.upload("known.png").await;

    let result = ctx
        .service
        .batch_cleanup_files(vec![a.id, 4242], None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.files_failed, 1);

    assert!(matches!(
        ctx.service
            .batch_cleanup_files(vec![], None, &CancellationToken::new())
            .await,
        Err(LifecycleError::Validation(_))
    ));
}

#[tokio::test]
async fn test_cancelled_job_is_marked_failed() {
    let ctx = setup().await;
    let a = ctx.upload("cancel/a.png").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = ctx
        .service
        .batch_cleanup_files(vec![a.id], None, &cancel)
        .await
        .unwrap();
    assert_eq!(result.files_processed, 0);
    assert_eq!(result.status, Some(JobStatus::Failed));

    let job = ctx.service.get_cleanup_job(result.job_id.unwrap()).await.unwrap();
    assert_eq!(job.error_message.as_deref(), Some("cancelled"));
    assert!(ctx.service.get_asset(a.id).await.is_ok());
}

#[tokio::test]
async fn test_manual_delete_releases_references() {
    let ctx = setup().await;
    let asset = ctx.upload("manual.png").await;
    ctx.service
        .add_reference(asset.id, &ReferenceTarget::new("user", "3"), None)
        .await
        .unwrap();

    ctx.service.delete_asset(asset.id, Some("admin")).await.unwrap();

    assert!(ctx.service.get_references_for("user", "3").await.unwrap().is_empty());
    assert!(matches!(
        ctx.service.delete_asset(asset.id, Some("admin")).await,
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        ctx.service
            .add_reference(asset.id, &ReferenceTarget::new("user", "3"), None)
            .await,
        Err(LifecycleError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mark_orphaned_sweep_catches_lost_events() {
    let ctx = setup().await;
    let asset = ctx.upload("sweep.png").await;
    ctx.service
        .add_reference(asset.id, &ReferenceTarget::new("product", "8"), None)
        .await
        .unwrap();
    ctx.service.recompute_reference_count(asset.id).await.unwrap();

    // Removal without the follow-up recompute, as if the event were lost.
    ctx.service.remove_reference(asset.id, "product", "8", None).await.unwrap();
    assert!(!ctx.service.get_asset(asset.id).await.unwrap().is_orphaned);

    assert_eq!(ctx.service.mark_orphaned_assets().await.unwrap(), 1);
    assert!(ctx.service.get_asset(asset.id).await.unwrap().is_orphaned);
    assert_eq!(ctx.service.mark_orphaned_assets().await.unwrap(), 0);
}

#[tokio::test]
async fn test_release_entity_references() {
    let ctx = setup().await;
    let a = ctx.upload("entity/a.png").await;
    let b = ctx.upload("entity/b.png").await;
    for asset in [&a, &b] {
        ctx.service
            .add_reference(asset.id, &ReferenceTarget::new("product", "77"), None)
            .await
            .unwrap();
    }

    let mut affected = ctx
        .service
        .release_entity_references("product", "77", Some("catalog"))
        .await
        .unwrap();
    affected.sort();
    assert_eq!(affected, vec![a.id, b.id]);
    assert!(ctx.service.get_references_for("product", "77").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_preview_does_not_mutate() {
    let ctx = setup().await;
    let asset = ctx.upload("preview.png").await;
    ctx.age_asset(asset.id, 48).await;

    let scope = ctx
        .service
        .preview_cleanup(&CleanupRequest::Temporary { max_age: 24 * HOUR })
        .await
        .unwrap();
    assert_eq!(scope.len(), 1);
    assert_eq!(scope[0].id, asset.id);

    assert!(ctx.service.get_asset(asset.id).await.is_ok());
    assert!(ctx.storage.deleted().is_empty());
    assert!(ctx.service.list_cleanup_jobs(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_external_deletion_retires_row_without_store_call() {
    let ctx = setup().await;
    let asset = ctx.upload("gone.png").await;
    ctx.service
        .add_reference(asset.id, &ReferenceTarget::new("product", "1"), None)
        .await
        .unwrap();

    ctx.service
        .handle_external_deletion("gone.png", Some("storage_provider"))
        .await
        .unwrap();

    assert!(ctx.service.get_asset(asset.id).await.is_err());
    assert!(ctx.storage.deleted().is_empty());
    assert!(ctx.service.get_references_for_asset(asset.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_statistics_and_audit_paging() {
    let ctx = setup().await;
    let a = ctx.upload("stats/a.png").await;
    ctx.upload("stats/b.png").await;
    ctx.service
        .add_reference(a.id, &ReferenceTarget::new("product", "1"), None)
        .await
        .unwrap();
    ctx.service.recompute_reference_count(a.id).await.unwrap();

    let stats = ctx.service.get_statistics().await.unwrap();
    assert_eq!(stats.total_assets, 2);
    assert_eq!(stats.temporary_assets, 1);
    assert_eq!(stats.orphaned_assets, 0);
    assert_eq!(stats.active_references, 1);
    assert_eq!(stats.total_bytes, 4096);
    assert_eq!(stats.assets_by_media_kind.get("image"), Some(&2));
    assert!(stats.last_job.is_none());

    // two uploads + one reference_add
    let page = ctx
        .service
        .get_audit_logs(&AuditLogFilter {
            per_page: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.page, 1);

    let entry = ctx
        .service
        .log_action(
            AuditEntry::new(AuditAction::Delete)
                .asset(a.id)
                .actor(Some("ops")),
        )
        .await
        .unwrap();
    assert_eq!(entry.action, "delete");
    assert_eq!(entry.actor_id.as_deref(), Some("ops"));
}

#[tokio::test]
async fn test_row_deletes_refuse_assets_that_gained_a_reference() {
    let ctx = setup().await;
    let repo = ctx.service.repository();

    // Temporary asset adopted after it was selected, before any recompute.
    let temp = ctx.upload("late/temp.png").await;
    ctx.service
        .add_reference(temp.id, &ReferenceTarget::new("post", "1"), None)
        .await
        .unwrap();
    assert!(ctx.service.get_asset(temp.id).await.unwrap().is_temporary);
    assert_eq!(repo.hard_delete_unreferenced_temporary(temp.id).await.unwrap(), 0);
    assert!(ctx.service.get_asset(temp.id).await.is_ok());

    // Flagged orphan re-referenced without a recompute.
    let orphan = ctx.upload("late/orphan.png").await;
    let target = ReferenceTarget::new("post", "2");
    ctx.service.add_reference(orphan.id, &target, None).await.unwrap();
    ctx.service.recompute_reference_count(orphan.id).await.unwrap();
    ctx.service.remove_reference(orphan.id, "post", "2", None).await.unwrap();
    ctx.service.recompute_reference_count(orphan.id).await.unwrap();
    ctx.service.add_reference(orphan.id, &target, None).await.unwrap();
    assert!(ctx.service.get_asset(orphan.id).await.unwrap().is_orphaned);
    assert_eq!(
        repo.soft_delete_unreferenced_orphan(orphan.id, chrono::Utc::now())
            .await
            .unwrap(),
        0
    );
    assert!(ctx.service.get_asset(orphan.id).await.is_ok());

    // Unreferenced rows still go.
    let idle = ctx.upload("late/idle.png").await;
    assert_eq!(repo.hard_delete_unreferenced_temporary(idle.id).await.unwrap(), 1);
    assert!(ctx.service.get_asset(idle.id).await.is_err());
}
