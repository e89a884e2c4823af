use crate::config::LifecycleConfig;
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::events::{EventChannel, EventError, FileEvent};
use crate::services::repository::AssetRepository;
use crate::services::storage::StorageService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

pub mod error;
pub mod reclamation;
pub mod references;
pub mod registration;
pub mod reporting;
pub mod types;

pub use error::{LifecycleError, LifecycleResult};
pub use types::*;

/// Central service for asset registration, reference tracking and reclamation.
///
/// Constructed once per process and shared through `Arc` with the event
/// consumer, the scheduler and the administrative API.
pub struct LifecycleService {
    repo: AssetRepository,
    storage: Arc<dyn StorageService>,
    events: Arc<EventChannel>,
    audit: AuditService,
    config: LifecycleConfig,
    reclaim_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl LifecycleService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        events: Arc<EventChannel>,
        config: LifecycleConfig,
    ) -> Self {
        let repo = AssetRepository::new(db);
        Self {
            audit: AuditService::new(repo.clone()),
            repo,
            storage,
            events,
            config,
            reclaim_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Background jobs spawned by the service stop between items once
    /// `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn repository(&self) -> &AssetRepository {
        &self.repo
    }

    pub fn storage(&self) -> &Arc<dyn StorageService> {
        &self.storage
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Writes one audit entry; unlike the internal bookkeeping writes, a
    /// persistence failure is returned.
    pub async fn log_action(
        &self,
        entry: AuditEntry,
    ) -> LifecycleResult<crate::entities::asset_audit_logs::Model> {
        Ok(self.audit.log_action(entry).await?)
    }

    /// Token for work started on behalf of a caller; cancelled with the process.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn reclamation_in_progress(&self) -> bool {
        self.reclaim_lock.try_lock().is_err()
    }

    /// Holds off every other reclamation run until the guard is dropped.
    pub async fn lock_reclamation(&self) -> MutexGuard<'_, ()> {
        self.reclaim_lock.lock().await
    }

    pub(crate) fn try_lock_reclamation(&self) -> Option<MutexGuard<'_, ()>> {
        self.reclaim_lock.try_lock().ok()
    }

    /// Publishes after the state change is durable; a lost event only
    /// delays reaction until the next scheduled sweep.
    fn emit(&self, event: FileEvent) {
        match self.events.publish(&event) {
            Ok(receivers) => tracing::debug!(
                "Published {} event for asset {} to {} subscriber(s)",
                event.kind,
                event.asset_id,
                receivers
            ),
            Err(EventError::NoSubscribers(topic)) => tracing::debug!(
                "No subscribers on {} for asset {}",
                topic,
                event.asset_id
            ),
            Err(e) => tracing::warn!(
                "Failed to publish {} event for asset {}: {}",
                event.kind,
                event.asset_id,
                e
            ),
        }
    }
}
