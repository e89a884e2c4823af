use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::consumer::EventHandler;
use super::event::FileEvent;
use crate::config::LifecycleConfig;
use crate::services::lifecycle::{LifecycleError, LifecycleService};

/// Recomputes flags after `reference_added` / `reference_removed`.
pub struct ReferenceCountHandler {
    service: Arc<LifecycleService>,
}

impl ReferenceCountHandler {
    pub fn new(service: Arc<LifecycleService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for ReferenceCountHandler {
    async fn handle(&self, event: &FileEvent) -> Result<(), LifecycleError> {
        match self.service.recompute_reference_count(event.asset_id).await {
            Ok(outcome) => {
                tracing::debug!(
                    "Asset {} now has {} active reference(s)",
                    outcome.asset_id,
                    outcome.active_references
                );
                Ok(())
            }
            // Deleted in the meantime; nothing left to derive.
            Err(LifecycleError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Schedules a deferred deletion check for each orphaned asset.
///
/// Checks are deduplicated per asset and bounded by
/// `max_pending_orphan_checks`; assets over the bound are left to the
/// scheduled orphan sweep.
pub struct OrphanHandler {
    service: Arc<LifecycleService>,
    auto_cleanup: bool,
    grace_period: Duration,
    max_pending: usize,
    pending: Arc<DashMap<i32, ()>>,
    cancel: CancellationToken,
}

impl OrphanHandler {
    pub fn new(
        service: Arc<LifecycleService>,
        config: &LifecycleConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            auto_cleanup: config.orphan_auto_cleanup,
            grace_period: config.orphan_grace_period(),
            max_pending: config.max_pending_orphan_checks,
            pending: Arc::new(DashMap::new()),
            cancel,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn pending_checks(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl EventHandler for OrphanHandler {
    async fn handle(&self, event: &FileEvent) -> Result<(), LifecycleError> {
        let asset_id = event.asset_id;

        if !self.auto_cleanup {
            tracing::info!(
                "Asset {} ({}) orphaned, left for the scheduled sweep",
                asset_id,
                event.public_id
            );
            return Ok(());
        }

        if self.pending.contains_key(&asset_id) {
            tracing::debug!("Orphan check for asset {} already pending", asset_id);
            return Ok(());
        }
        if self.pending.len() >= self.max_pending {
            tracing::warn!(
                "{} orphan checks pending, asset {} deferred to the scheduled sweep",
                self.pending.len(),
                asset_id
            );
            return Ok(());
        }
        self.pending.insert(asset_id, ());

        let service = Arc::clone(&self.service);
        let pending = Arc::clone(&self.pending);
        let cancel = self.cancel.clone();
        let grace_period = self.grace_period;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Orphan check for asset {} cancelled", asset_id);
                }
                _ = tokio::time::sleep(grace_period) => {
                    match service.reclaim_if_still_orphaned(asset_id, grace_period).await {
                        Ok(true) => tracing::info!("Reclaimed orphaned asset {}", asset_id),
                        Ok(false) => {}
                        Err(e) => tracing::error!(
                            "Deferred orphan check for asset {} failed: {}",
                            asset_id,
                            e
                        ),
                    }
                }
            }
            pending.remove(&asset_id);
        });

        Ok(())
    }
}
