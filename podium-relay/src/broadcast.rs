//! Broadcast relay
//!
//! Listens on a pub/sub topic and applies each intention as it arrives.
//! Nothing is persisted: whatever is published while the relay is not
//! subscribed, or while it lags too far behind, is lost. The write-through
//! subscriber is this relay pointed at the write-through topic.

use async_trait::async_trait;
use podium_core::{CancelSignal, PodiumResult, RelayKind};
use podium_events::{ChannelEvent, IntentionChannel, Subscription};
use std::sync::atomic::Ordering;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::apply::IntentionApplier;
use crate::metrics::{RelayMetrics, RelayReport};
use crate::WriteBehindRelay;

#[derive(Debug)]
pub struct BroadcastRelay {
    topic: String,
    subscription: Mutex<Option<Subscription>>,
    applier: IntentionApplier,
    metrics: RelayMetrics,
}

impl BroadcastRelay {
    /// Subscribe now, so every message published after this returns is seen
    /// once the relay runs.
    pub async fn subscribe(
        channel: &dyn IntentionChannel,
        topic: impl Into<String>,
        applier: IntentionApplier,
    ) -> PodiumResult<Self> {
        let topic = topic.into();
        let subscription = channel.subscribe(&topic).await?;
        info!(topic = %topic, "Broadcast relay subscribed");
        Ok(Self {
            topic,
            subscription: Mutex::new(Some(subscription)),
            applier,
            metrics: RelayMetrics::new(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    async fn handle(&self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::Message(raw) => {
                if let Err(e) = self
                    .applier
                    .deliver(&raw, RelayKind::Broadcast, &self.metrics)
                    .await
                {
                    RelayMetrics::incr(&self.metrics.errors);
                    warn!(topic = %self.topic, error = %e, "Broadcast intention lost");
                }
                RelayMetrics::incr(&self.metrics.cycles);
                true
            }
            ChannelEvent::Lagged(n) => {
                self.metrics.dropped.fetch_add(n, Ordering::Relaxed);
                warn!(topic = %self.topic, dropped = n, "Broadcast relay lagged, intentions dropped");
                true
            }
            ChannelEvent::Closed => {
                info!(topic = %self.topic, "Broadcast topic closed");
                false
            }
        }
    }
}

#[async_trait]
impl WriteBehindRelay for BroadcastRelay {
    fn kind(&self) -> RelayKind {
        RelayKind::Broadcast
    }

    fn name(&self) -> String {
        self.topic.clone()
    }

    async fn run(&self, mut shutdown: CancelSignal) -> RelayReport {
        let Some(mut subscription) = self.subscription.lock().await.take() else {
            warn!(topic = %self.topic, "Broadcast relay already consumed its subscription");
            return self.metrics.report(self.kind(), self.name());
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = subscription.recv() => {
                    if !self.handle(event).await {
                        break;
                    }
                }
            }
        }

        subscription.unsubscribe();
        let report = self.metrics.report(self.kind(), self.name());
        info!(topic = %self.topic, applied = report.applied, dropped = report.dropped, "Broadcast relay stopped");
        report
    }
}
