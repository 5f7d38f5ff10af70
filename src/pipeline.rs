//! Fan-out pipeline
//!
//! ```text
//! ContentEvent ─► AudienceResolver ─► NotificationMaterializer ─► DeliveryRegistry
//!                 (list_followers)     (one atomic bulk insert)    (live push)
//! ```
//!
//! Rows are persisted before anything is pushed, so a live notification always
//! carries its store id and can be found again through `List`.

use std::sync::Arc;
use std::time::Instant;

use crate::audience::{AudienceResolver, FollowerGraph};
use crate::error::Result;
use crate::event::ContentEvent;
use crate::ingress::EventProcessor;
use crate::materializer::NotificationMaterializer;
use crate::registry::DeliveryRegistry;
use crate::store::NotificationStore;

/// What processing one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The originator has no followers; nothing was written or pushed
    NoAudience,
    /// Rows were stored and pushed to live sessions
    Delivered {
        /// Rows written
        persisted: usize,
        /// Session deliveries across all recipients
        pushed: usize,
    },
}

/// Resolves, stores and broadcasts notifications for content events
pub struct NotificationPipeline<G, S> {
    resolver: AudienceResolver<G>,
    materializer: NotificationMaterializer<S>,
    registry: Arc<DeliveryRegistry>,
}

impl<G: FollowerGraph, S: NotificationStore> NotificationPipeline<G, S> {
    pub fn new(graph: Arc<G>, store: Arc<S>, registry: Arc<DeliveryRegistry>) -> Self {
        Self {
            resolver: AudienceResolver::new(graph),
            materializer: NotificationMaterializer::new(store),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<DeliveryRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<S> {
        self.materializer.store()
    }

    /// Run one event through the pipeline
    ///
    /// A graph or store failure is returned before anything is broadcast.
    pub async fn handle(&self, event: &ContentEvent) -> Result<ProcessOutcome> {
        let started_at = Instant::now();

        let audience = self.resolver.resolve(event.origin_user_id).await?;
        if audience.is_empty() {
            tracing::debug!(
                origin = event.origin_user_id,
                content_id = event.content_id,
                "No audience, skipping"
            );
            return Ok(ProcessOutcome::NoAudience);
        }

        let rows = self.materializer.materialize(event, &audience).await?;
        let persisted = rows.len();

        let pushed: usize = rows
            .into_iter()
            .map(|row| self.registry.broadcast(&Arc::new(row)))
            .sum();

        tracing::info!(
            origin = event.origin_user_id,
            content_id = event.content_id,
            persisted = persisted,
            pushed = pushed,
            duration_ms = started_at.elapsed().as_millis() as u64,
            "Event fanned out"
        );

        Ok(ProcessOutcome::Delivered { persisted, pushed })
    }
}

impl<G: FollowerGraph, S: NotificationStore> EventProcessor for NotificationPipeline<G, S> {
    async fn process(&self, event: ContentEvent) -> Result<()> {
        self.handle(&event).await.map(|_| ())
    }
}
