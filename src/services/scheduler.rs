use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleConfig;
use crate::services::lifecycle::{CleanupRequest, CleanupResult, LifecycleResult, LifecycleService};

/// What one scheduled sweep did.
#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub temporary: Option<CleanupResult>,
    pub orphaned: Option<CleanupResult>,
    pub marked_orphaned: u64,
    /// Another reclamation run held the lock, nothing was attempted.
    pub skipped: bool,
}

/// Periodic safety net: temporary sweep, orphan sweep, then the orphan
/// flagging pass that catches lost `reference_removed` events.
pub struct CleanupScheduler {
    service: Arc<LifecycleService>,
    interval: Duration,
    temp_max_age: Duration,
    grace_period: Duration,
}

impl CleanupScheduler {
    pub fn new(service: Arc<LifecycleService>, config: &LifecycleConfig) -> Self {
        Self {
            service,
            interval: config.cleanup_interval(),
            temp_max_age: config.temp_max_age(),
            grace_period: config.orphan_grace_period(),
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "🚀 Cleanup scheduler started (every {}s)",
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("🛑 Cleanup scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(&cancel).await {
                        tracing::error!("Scheduled sweep failed: {}", e);
                    }
                }
            }
        }
    }

    pub async fn run_once(&self, cancel: &CancellationToken) -> LifecycleResult<SweepSummary> {
        tracing::info!("🧹 Running scheduled cleanup sweep...");
        let mut summary = SweepSummary::default();

        summary.temporary = self
            .service
            .try_run_cleanup(
                CleanupRequest::Temporary {
                    max_age: self.temp_max_age,
                },
                cancel,
            )
            .await?;
        if summary.temporary.is_none() {
            tracing::info!("Reclamation already in progress, skipping this sweep");
            summary.skipped = true;
            return Ok(summary);
        }

        if cancel.is_cancelled() {
            return Ok(summary);
        }
        summary.orphaned = self
            .service
            .try_run_cleanup(
                CleanupRequest::Orphaned {
                    grace_period: self.grace_period,
                },
                cancel,
            )
            .await?;

        if cancel.is_cancelled() {
            return Ok(summary);
        }
        summary.marked_orphaned = self.service.mark_orphaned_assets().await?;

        let deleted = |r: &Option<CleanupResult>| r.as_ref().map_or(0, |r| r.files_deleted);
        let failed = |r: &Option<CleanupResult>| r.as_ref().map_or(0, |r| r.files_failed);
        tracing::info!(
            temporary_deleted = deleted(&summary.temporary),
            orphaned_deleted = deleted(&summary.orphaned),
            failed = failed(&summary.temporary) + failed(&summary.orphaned),
            marked_orphaned = summary.marked_orphaned,
            "✅ Scheduled cleanup sweep completed"
        );

        Ok(summary)
    }
}
