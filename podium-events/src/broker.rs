//! Broker and outbox
//!
//! The write path records intentions in an [`Outbox`]; the broker relay
//! dispatches undelivered records onto a [`Broker`] queue and consumes
//! deliveries with ack / nack semantics.

use async_trait::async_trait;
use chrono::Utc;
use podium_core::{PodiumResult, RelayError, Timestamp};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, trace};

// ============================================================================
// OUTBOX
// ============================================================================

/// One recorded intention awaiting dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub id: u64,
    pub payload: String,
    pub created_at: Timestamp,
    pub dispatched_at: Option<Timestamp>,
}

/// Durable staging area between the write path and the broker.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn record(&self, payload: String) -> PodiumResult<u64>;

    /// Oldest undispatched records, up to `limit`.
    async fn undispatched(&self, limit: usize) -> PodiumResult<Vec<OutboxRecord>>;

    async fn mark_dispatched(&self, id: u64) -> PodiumResult<()>;
}

/// In-process [`Outbox`]. Dispatched records are kept for inspection.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    records: Mutex<BTreeMap<u64, OutboxRecord>>,
    next_id: AtomicU64,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn pending_count(&self) -> usize {
        self.records
            .lock()
            .await
            .values()
            .filter(|r| r.dispatched_at.is_none())
            .count()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn record(&self, payload: String) -> PodiumResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.lock().await.insert(
            id,
            OutboxRecord {
                id,
                payload,
                created_at: Utc::now(),
                dispatched_at: None,
            },
        );
        trace!(id, "Recorded outbox entry");
        Ok(id)
    }

    async fn undispatched(&self, limit: usize) -> PodiumResult<Vec<OutboxRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.dispatched_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_dispatched(&self, id: u64) -> PodiumResult<()> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(&id).ok_or_else(|| RelayError::Broker {
            queue: "outbox".to_string(),
            reason: format!("unknown outbox record {}", id),
        })?;
        record.dispatched_at = Some(Utc::now());
        Ok(())
    }
}

// ============================================================================
// BROKER
// ============================================================================

/// A message handed to a consumer. Must be acked or nacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: u64,
    pub queue: String,
    pub payload: String,
    /// Number of previous delivery attempts.
    pub redeliveries: u32,
}

/// At-least-once message queue.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: &str, payload: String) -> PodiumResult<u64>;

    /// Take the next message, if any, without blocking.
    async fn receive(&self, queue: &str) -> PodiumResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> PodiumResult<()>;

    /// Return a delivery to the head of its queue.
    async fn nack(&self, delivery: Delivery) -> PodiumResult<()>;

    /// Messages waiting in the queue (in-flight deliveries excluded).
    async fn depth(&self, queue: &str) -> PodiumResult<usize>;
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Delivery>>,
    in_flight: HashMap<u64, Delivery>,
}

/// In-process [`Broker`]. A nacked delivery goes back to the head of its
/// queue so ordering holds for a single consumer.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    next_id: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, queue: &str, payload: String) -> PodiumResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(Delivery {
                id,
                queue: queue.to_string(),
                payload,
                redeliveries: 0,
            });
        trace!(queue, id, "Published to broker");
        Ok(id)
    }

    async fn receive(&self, queue: &str) -> PodiumResult<Option<Delivery>> {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.queues.get_mut(queue).and_then(|q| q.pop_front()) else {
            return Ok(None);
        };
        state.in_flight.insert(delivery.id, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> PodiumResult<()> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(&delivery.id)
            .map(|_| ())
            .ok_or_else(|| {
                RelayError::Broker {
                    queue: delivery.queue.clone(),
                    reason: format!("delivery {} is not in flight", delivery.id),
                }
                .into()
            })
    }

    async fn nack(&self, mut delivery: Delivery) -> PodiumResult<()> {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&delivery.id).is_none() {
            return Err(RelayError::Broker {
                queue: delivery.queue.clone(),
                reason: format!("delivery {} is not in flight", delivery.id),
            }
            .into());
        }
        delivery.redeliveries += 1;
        debug!(queue = %delivery.queue, id = delivery.id, redeliveries = delivery.redeliveries, "Requeued delivery");
        state
            .queues
            .entry(delivery.queue.clone())
            .or_default()
            .push_front(delivery);
        Ok(())
    }

    async fn depth(&self, queue: &str) -> PodiumResult<usize> {
        Ok(self
            .state
            .lock()
            .await
            .queues
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outbox_dispatch_lifecycle() {
        let outbox = InMemoryOutbox::new();
        let a = outbox.record("a".to_string()).await.unwrap();
        outbox.record("b".to_string()).await.unwrap();

        let pending = outbox.undispatched(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].payload, "a");

        outbox.mark_dispatched(a).await.unwrap();
        let pending = outbox.undispatched(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, "b");
        assert_eq!(outbox.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_outbox_unknown_record() {
        let outbox = InMemoryOutbox::new();
        assert!(outbox.mark_dispatched(42).await.is_err());
    }

    #[tokio::test]
    async fn test_broker_fifo_and_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "1".to_string()).await.unwrap();
        broker.publish("q", "2".to_string()).await.unwrap();

        let first = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(first.payload, "1");
        assert_eq!(broker.in_flight().await, 1);
        broker.ack(&first).await.unwrap();
        assert_eq!(broker.in_flight().await, 0);
        assert_eq!(broker.depth("q").await.unwrap(), 1);

        // Double ack is rejected.
        assert!(broker.ack(&first).await.is_err());
    }

    #[tokio::test]
    async fn test_nack_redelivers_first() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "1".to_string()).await.unwrap();
        broker.publish("q", "2".to_string()).await.unwrap();

        let first = broker.receive("q").await.unwrap().unwrap();
        broker.nack(first).await.unwrap();

        let again = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(again.payload, "1");
        assert_eq!(again.redeliveries, 1);
    }

    #[tokio::test]
    async fn test_empty_queue_receives_none() {
        let broker = InMemoryBroker::new();
        assert!(broker.receive("q").await.unwrap().is_none());
        assert_eq!(broker.depth("q").await.unwrap(), 0);
    }
}
