//! Intention pub/sub channel
//!
//! Topic-based fire-and-forget messaging used by the write-through subscriber
//! and the broadcast relay. Nothing is persisted: a message published while
//! no subscriber is listening is gone.

use async_trait::async_trait;
use dashmap::DashMap;
use podium_core::{PodiumResult, RelayError, WriteIntention};
use tokio::sync::broadcast;
use tracing::debug;

/// What a subscriber sees on its next receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A raw payload as published.
    Message(String),
    /// The subscriber fell behind and `n` messages were dropped.
    Lagged(u64),
    /// The topic is gone; no further messages will arrive.
    Closed,
}

/// A live subscription to one topic. Dropping it (or calling
/// [`Subscription::unsubscribe`]) removes the listener.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, rx: broadcast::Receiver<String>) -> Self {
        Self {
            topic: topic.into(),
            rx,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message on the topic.
    pub async fn recv(&mut self) -> ChannelEvent {
        match self.rx.recv().await {
            Ok(payload) => ChannelEvent::Message(payload),
            Err(broadcast::error::RecvError::Lagged(n)) => ChannelEvent::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => ChannelEvent::Closed,
        }
    }

    pub fn unsubscribe(self) {
        debug!(topic = %self.topic, "Unsubscribed");
    }
}

/// Pub/sub contract over intentions.
#[async_trait]
pub trait IntentionChannel: Send + Sync {
    /// Publish a raw payload. Returns the number of subscribers reached;
    /// zero subscribers is not an error.
    async fn publish_raw(&self, topic: &str, payload: String) -> PodiumResult<usize>;

    /// Subscribe to a topic, creating it if needed.
    async fn subscribe(&self, topic: &str) -> PodiumResult<Subscription>;

    /// Number of live subscriptions on a topic.
    fn subscriber_count(&self, topic: &str) -> usize;

    /// Encode and publish an intention.
    async fn publish(&self, topic: &str, intention: &WriteIntention) -> PodiumResult<usize> {
        let payload = intention.encode().map_err(|e| RelayError::Malformed {
            reason: e.to_string(),
        })?;
        self.publish_raw(topic, payload).await
    }
}

/// In-process [`IntentionChannel`] backed by one `tokio::sync::broadcast`
/// channel per topic.
#[derive(Debug)]
pub struct BroadcastChannel {
    topics: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl BroadcastChannel {
    /// Create a channel whose topics buffer up to `capacity` messages per
    /// slow subscriber before it starts lagging.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(podium_core::DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl IntentionChannel for BroadcastChannel {
    async fn publish_raw(&self, topic: &str, payload: String) -> PodiumResult<usize> {
        match self.sender(topic).send(payload) {
            Ok(receivers) => {
                debug!(topic, receivers, "Published intention");
                Ok(receivers)
            }
            Err(_) => {
                debug!(topic, "No subscribers for intention");
                Ok(0)
            }
        }
    }

    async fn subscribe(&self, topic: &str) -> PodiumResult<Subscription> {
        let rx = self.sender(topic).subscribe();
        debug!(topic, "Subscribed");
        Ok(Subscription::new(topic, rx))
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_core::{LeaderboardEntry, LeaderboardName, PlayerId};

    fn intention() -> WriteIntention {
        WriteIntention::added(&LeaderboardEntry::new(
            LeaderboardName::global(),
            PlayerId::new("p1").unwrap(),
            5.0,
        ))
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let channel = BroadcastChannel::new(8);
        let reached = channel.publish("t", &intention()).await.unwrap();
        assert_eq!(reached, 0);

        let mut sub = channel.subscribe("t").await.unwrap();
        channel.publish_raw("t", "after".to_string()).await.unwrap();
        assert_eq!(sub.recv().await, ChannelEvent::Message("after".to_string()));
    }

    #[tokio::test]
    async fn test_subscribers_receive_encoded_intention() {
        let channel = BroadcastChannel::new(8);
        let mut sub = channel.subscribe("t").await.unwrap();
        let sent = intention();
        assert_eq!(channel.publish("t", &sent).await.unwrap(), 1);

        match sub.recv().await {
            ChannelEvent::Message(raw) => {
                assert_eq!(WriteIntention::decode(&raw).unwrap().id(), sent.id());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let channel = BroadcastChannel::new(8);
        let _a = channel.subscribe("a").await.unwrap();
        assert_eq!(channel.publish_raw("b", "x".to_string()).await.unwrap(), 0);
        assert_eq!(channel.subscriber_count("a"), 1);
        assert_eq!(channel.subscriber_count("b"), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_listener() {
        let channel = BroadcastChannel::new(8);
        let sub = channel.subscribe("t").await.unwrap();
        assert_eq!(channel.subscriber_count("t"), 1);
        sub.unsubscribe();
        assert_eq!(channel.subscriber_count("t"), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let channel = BroadcastChannel::new(2);
        let mut sub = channel.subscribe("t").await.unwrap();
        for i in 0..5 {
            channel.publish_raw("t", i.to_string()).await.unwrap();
        }
        assert_eq!(sub.recv().await, ChannelEvent::Lagged(3));
        assert_eq!(sub.recv().await, ChannelEvent::Message("3".to_string()));
    }
}
