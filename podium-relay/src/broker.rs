//! Broker relay
//!
//! Two halves on one timer. The dispatcher moves undelivered outbox records
//! onto the broker queue; the consumer drains the queue into the source of
//! record. A delivery that fails with a retryable store error is nacked so
//! the broker hands it out again after a backoff; anything else, or a
//! delivery out of redeliveries, is dead-lettered and acked.

use async_trait::async_trait;
use podium_core::{CancelSignal, PodiumResult, RelayError, RelayKind, WriteIntention};
use podium_events::{Broker, Delivery, Outbox};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::apply::IntentionApplier;
use crate::metrics::{RelayMetrics, RelayReport};
use crate::WriteBehindRelay;

/// Outbox records moved to the broker per dispatch.
const DISPATCH_BATCH: usize = 256;

pub struct BrokerRelay {
    outbox: Arc<dyn Outbox>,
    broker: Arc<dyn Broker>,
    queue: String,
    applier: IntentionApplier,
    dispatch_interval: Duration,
    metrics: RelayMetrics,
}

impl BrokerRelay {
    pub fn new(
        outbox: Arc<dyn Outbox>,
        broker: Arc<dyn Broker>,
        queue: impl Into<String>,
        applier: IntentionApplier,
        dispatch_interval: Duration,
    ) -> Self {
        Self {
            outbox,
            broker,
            queue: queue.into(),
            applier,
            dispatch_interval,
            metrics: RelayMetrics::new(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Publish pending outbox records in creation order. Returns how many
    /// were dispatched.
    pub async fn dispatch_outbox(&self) -> PodiumResult<usize> {
        let records = self.outbox.undispatched(DISPATCH_BATCH).await?;
        let mut dispatched = 0;
        for record in records {
            self.broker.publish(&self.queue, record.payload).await?;
            self.outbox.mark_dispatched(record.id).await?;
            dispatched += 1;
        }
        if dispatched > 0 {
            debug!(queue = %self.queue, dispatched, "Outbox dispatched");
        }
        Ok(dispatched)
    }

    /// Drain the queue. Stops early and returns the backoff to wait when a
    /// delivery was nacked for a later retry.
    pub async fn consume_available(&self) -> PodiumResult<Option<Duration>> {
        while let Some(delivery) = self.broker.receive(&self.queue).await? {
            if let Some(backoff) = self.consume(delivery).await? {
                return Ok(Some(backoff));
            }
        }
        Ok(None)
    }

    async fn consume(&self, delivery: Delivery) -> PodiumResult<Option<Duration>> {
        let intention = match WriteIntention::decode(&delivery.payload) {
            Ok(intention) => intention,
            Err(e) => {
                let reason = RelayError::Malformed {
                    reason: e.to_string(),
                };
                self.applier
                    .dead_letter(
                        &delivery.payload,
                        RelayKind::Broker,
                        reason.to_string(),
                        delivery.redeliveries + 1,
                        &self.metrics,
                    )
                    .await?;
                self.broker.ack(&delivery).await?;
                return Ok(None);
            }
        };

        match self.applier.apply(&intention).await {
            Ok(entry) => {
                self.broker.ack(&delivery).await?;
                RelayMetrics::incr(&self.metrics.applied);
                debug!(
                    queue = %self.queue,
                    delivery_id = delivery.id,
                    player_id = %entry.player_id,
                    "Intention applied"
                );
                Ok(None)
            }
            Err(e) if e.is_retryable() && delivery.redeliveries < self.applier.retry().max_retries => {
                let backoff = self
                    .applier
                    .retry()
                    .delay_for_attempt(delivery.redeliveries + 1);
                warn!(
                    queue = %self.queue,
                    delivery_id = delivery.id,
                    redeliveries = delivery.redeliveries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Delivery failed, requeued"
                );
                self.broker.nack(delivery).await?;
                RelayMetrics::incr(&self.metrics.retried);
                Ok(Some(backoff))
            }
            Err(e) => {
                let attempts = delivery.redeliveries + 1;
                let reason = RelayError::DeliveryFailed {
                    intention: intention.id().to_string(),
                    attempts,
                    reason: e.to_string(),
                };
                self.applier
                    .dead_letter(
                        &delivery.payload,
                        RelayKind::Broker,
                        reason.to_string(),
                        attempts,
                        &self.metrics,
                    )
                    .await?;
                self.broker.ack(&delivery).await?;
                Ok(None)
            }
        }
    }

    /// Dispatch then consume once.
    pub async fn cycle(&self) -> PodiumResult<Option<Duration>> {
        self.dispatch_outbox().await?;
        let backoff = self.consume_available().await?;
        RelayMetrics::incr(&self.metrics.cycles);
        Ok(backoff)
    }
}

#[async_trait]
impl WriteBehindRelay for BrokerRelay {
    fn kind(&self) -> RelayKind {
        RelayKind::Broker
    }

    fn name(&self) -> String {
        self.queue.clone()
    }

    async fn run(&self, mut shutdown: CancelSignal) -> RelayReport {
        let mut ticker = interval(self.dispatch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            queue = %self.queue,
            dispatch_interval_ms = self.dispatch_interval.as_millis() as u64,
            "Broker relay started"
        );

        'outer: loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.cycle().await {
                        Ok(Some(backoff)) => {
                            tokio::select! {
                                _ = shutdown.cancelled() => break 'outer,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            RelayMetrics::incr(&self.metrics.errors);
                            warn!(queue = %self.queue, error = %e, "Broker cycle failed");
                        }
                    }
                }
            }
        }

        let report = self.metrics.report(self.kind(), self.name());
        info!(
            queue = %self.queue,
            applied = report.applied,
            retried = report.retried,
            dead_lettered = report.dead_lettered,
            "Broker relay stopped"
        );
        report
    }
}

impl std::fmt::Debug for BrokerRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRelay")
            .field("queue", &self.queue)
            .field("dispatch_interval", &self.dispatch_interval)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
