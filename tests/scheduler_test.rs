mod common;

use asset_lifecycle::config::LifecycleConfig;
use asset_lifecycle::services::lifecycle::{CleanupRequest, ReferenceTarget};
use asset_lifecycle::services::scheduler::CleanupScheduler;
use common::setup;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_sweep_runs_all_passes() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();

    let stale = ctx.upload("sweep/stale.png").await;
    ctx.age_asset(stale.id, 48).await;

    let expired = ctx.upload("sweep/expired.png").await;
    ctx.service
        .add_reference(expired.id, &ReferenceTarget::new("post", "1"), None)
        .await
        .unwrap();
    ctx.service.recompute_reference_count(expired.id).await.unwrap();
    ctx.service.remove_reference(expired.id, "post", "1", None).await.unwrap();
    ctx.service.recompute_reference_count(expired.id).await.unwrap();
    ctx.age_orphan_mark(expired.id, 100).await;

    let unflagged = ctx.upload("sweep/unflagged.png").await;
    ctx.service
        .add_reference(unflagged.id, &ReferenceTarget::new("post", "2"), None)
        .await
        .unwrap();
    ctx.service.recompute_reference_count(unflagged.id).await.unwrap();
    ctx.service.remove_reference(unflagged.id, "post", "2", None).await.unwrap();

    let scheduler = CleanupScheduler::new(Arc::clone(&ctx.service), &ctx.config);
    let summary = scheduler.run_once(&cancel).await.unwrap();

    assert!(!summary.skipped);
    assert_eq!(summary.temporary.unwrap().deleted_ids, vec![stale.id]);
    assert_eq!(summary.orphaned.unwrap().deleted_ids, vec![expired.id]);
    assert_eq!(summary.marked_orphaned, 1);
    assert!(ctx.service.get_asset(unflagged.id).await.unwrap().is_orphaned);

    let jobs = ctx.service.list_cleanup_jobs(10).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| job.status == "completed"));
}

#[tokio::test]
async fn test_sweep_skips_while_reclamation_runs() {
    let ctx = setup().await;
    let cancel = CancellationToken::new();
    let stale = ctx.upload("overlap/stale.png").await;
    ctx.age_asset(stale.id, 48).await;

    let scheduler = CleanupScheduler::new(Arc::clone(&ctx.service), &ctx.config);
    let guard = ctx.service.lock_reclamation().await;
    assert!(ctx.service.reclamation_in_progress());
    let summary = scheduler.run_once(&cancel).await.unwrap();
    drop(guard);

    assert!(summary.skipped);
    assert!(summary.temporary.is_none());
    assert!(ctx.service.get_asset(stale.id).await.is_ok());
}

#[tokio::test]
async fn test_scheduled_job_runs_in_background() {
    let ctx = setup().await;
    let a = ctx.upload("jobs/a.png").await;

    let job = ctx
        .service
        .schedule_cleanup_job(CleanupRequest::Manual { ids: vec![a.id] }, Some("ops".to_string()))
        .await
        .unwrap();
    assert_eq!(job.status, "pending");

    let mut finished = None;
    for _ in 0..100 {
        let current = ctx.service.get_cleanup_job(job.id).await.unwrap();
        if current.status == "completed" || current.status == "failed" {
            finished = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let finished = finished.expect("job should finish");
    assert_eq!(finished.status, "completed");
    assert_eq!(finished.files_deleted, 1);
    assert!(ctx.service.get_asset(a.id).await.is_err());
}

#[tokio::test]
async fn test_scheduler_loop_stops_on_cancel() {
    let config = LifecycleConfig {
        cleanup_interval_minutes: 1,
        ..Default::default()
    };
    let ctx = common::setup_with(config).await;
    let cancel = CancellationToken::new();

    let scheduler = CleanupScheduler::new(Arc::clone(&ctx.service), &ctx.config);
    let handle = tokio::spawn(scheduler.run(cancel.clone()));

    // The first tick fires immediately.
    let service = Arc::clone(&ctx.service);
    let mut ran = false;
    for _ in 0..100 {
        if !service.list_cleanup_jobs(10).await.unwrap().is_empty() {
            ran = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(ran);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("scheduler should stop on cancellation")
        .unwrap();
}
