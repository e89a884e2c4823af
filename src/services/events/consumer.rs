use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::channel::{Envelope, EventChannel, Subscription};
use super::event::{FileEvent, FileEventKind};
use super::handlers::{OrphanHandler, ReferenceCountHandler};
use crate::config::LifecycleConfig;
use crate::services::lifecycle::{LifecycleError, LifecycleService};

/// Reaction to one decoded event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &FileEvent) -> Result<(), LifecycleError>;
}

/// Single subscriber that dispatches every event kind to its handler.
///
/// A failing handler is logged and the loop moves on; one bad message must
/// never stop consumption.
pub struct EventConsumer {
    channel: Arc<EventChannel>,
    service: Arc<LifecycleService>,
    handlers: HashMap<FileEventKind, Arc<dyn EventHandler>>,
}

impl EventConsumer {
    pub fn new(channel: Arc<EventChannel>, service: Arc<LifecycleService>) -> Self {
        Self {
            channel,
            service,
            handlers: HashMap::new(),
        }
    }

    /// Replaces the handler for `kind`.
    pub fn register(mut self, kind: FileEventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Reference changes recompute the count, orphaned events go to the
    /// deferred deletion check.
    pub fn with_stock_handlers(
        channel: Arc<EventChannel>,
        service: Arc<LifecycleService>,
        config: &LifecycleConfig,
        cancel: CancellationToken,
    ) -> Self {
        let recompute: Arc<dyn EventHandler> =
            Arc::new(ReferenceCountHandler::new(Arc::clone(&service)));
        let orphans: Arc<dyn EventHandler> = Arc::new(OrphanHandler::new(
            Arc::clone(&service),
            config,
            cancel,
        ));

        Self::new(channel, service)
            .register(FileEventKind::ReferenceAdded, Arc::clone(&recompute))
            .register(FileEventKind::ReferenceRemoved, recompute)
            .register(FileEventKind::Orphaned, orphans)
    }

    /// Subscribes before spawning so no event published after this call
    /// returns is missed.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let subscription = self.channel.subscribe(&FileEventKind::ALL);
        tokio::spawn(async move { self.consume(subscription, cancel).await })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let subscription = self.channel.subscribe(&FileEventKind::ALL);
        self.consume(subscription, cancel).await
    }

    async fn consume(self, mut subscription: Subscription, cancel: CancellationToken) {
        tracing::info!(
            "🚀 Event consumer started on {} topic(s)",
            subscription.topics().len()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("🛑 Event consumer shutting down");
                    break;
                }
                next = subscription.recv() => match next {
                    Some(envelope) => self.dispatch(&envelope).await,
                    None => {
                        tracing::warn!("Event channel closed, consumer exiting");
                        break;
                    }
                },
            }
        }
    }

    pub async fn dispatch(&self, envelope: &Envelope) {
        let event = match envelope.decode() {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("Dropping undecodable event: {}", e);
                return;
            }
        };

        let result = match self.handlers.get(&event.kind) {
            Some(handler) => handler.handle(&event).await,
            None => self.handle_default(&event).await,
        };

        if let Err(e) = result {
            tracing::error!(
                "Handler for {} event on asset {} failed: {}",
                event.kind,
                event.asset_id,
                e
            );
        }
    }

    async fn handle_default(&self, event: &FileEvent) -> Result<(), LifecycleError> {
        if event.kind.is_reference_change() {
            self.service.recompute_reference_count(event.asset_id).await?;
        } else {
            tracing::debug!(
                "{} event for asset {} ({})",
                event.kind,
                event.asset_id,
                event.public_id
            );
        }
        Ok(())
    }
}
