//! Intention hand-off for write-behind.
//!
//! Each enabled relay has a matching hand-off target: the durable log gets
//! one stream per entry, the broadcast relay a pub/sub topic, the broker
//! relay the outbox.

use podium_core::{PodiumResult, RelayKind, WriteIntention, WRITE_BEHIND_TOPIC};
use podium_events::{DurableLog, IntentionChannel, Outbox};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Where an intention is recorded for one relay kind.
#[derive(Clone)]
pub enum HandoffTarget {
    DurableLog(Arc<dyn DurableLog>),
    Broadcast {
        channel: Arc<dyn IntentionChannel>,
        topic: String,
    },
    Outbox(Arc<dyn Outbox>),
}

impl HandoffTarget {
    pub fn broadcast(channel: Arc<dyn IntentionChannel>) -> Self {
        HandoffTarget::Broadcast {
            channel,
            topic: WRITE_BEHIND_TOPIC.to_string(),
        }
    }

    pub fn kind(&self) -> RelayKind {
        match self {
            HandoffTarget::DurableLog(_) => RelayKind::DurableLog,
            HandoffTarget::Broadcast { .. } => RelayKind::Broadcast,
            HandoffTarget::Outbox(_) => RelayKind::Broker,
        }
    }

    async fn send(&self, intention: &WriteIntention, payload: String) -> PodiumResult<()> {
        match self {
            HandoffTarget::DurableLog(log) => {
                log.append(&intention.stream_key(), payload).await?;
            }
            HandoffTarget::Broadcast { channel, topic } => {
                if channel.publish_raw(topic, payload).await? == 0 {
                    warn!(
                        intention_id = %intention.id(),
                        topic = %topic,
                        "No broadcast relay listening, intention dropped"
                    );
                }
            }
            HandoffTarget::Outbox(outbox) => {
                outbox.record(payload).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HandoffTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandoffTarget({})", self.kind())
    }
}

/// Fan-out of one intention to every configured target.
#[derive(Debug, Clone, Default)]
pub struct IntentionHandoff {
    targets: Vec<HandoffTarget>,
}

impl IntentionHandoff {
    pub fn new(targets: Vec<HandoffTarget>) -> Self {
        Self { targets }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn kinds(&self) -> Vec<RelayKind> {
        self.targets.iter().map(HandoffTarget::kind).collect()
    }

    /// Record the intention everywhere. The cache write has already
    /// happened, so failures are logged rather than returned. Returns the
    /// number of targets that accepted the intention.
    pub async fn hand_off(&self, intention: &WriteIntention) -> usize {
        let payload = match intention.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(intention_id = %intention.id(), error = %e, "Intention could not be encoded");
                return 0;
            }
        };

        let mut accepted = 0;
        for target in &self.targets {
            match target.send(intention, payload.clone()).await {
                Ok(()) => accepted += 1,
                Err(e) => error!(
                    relay = %target.kind(),
                    intention_id = %intention.id(),
                    error = %e,
                    "Intention hand-off failed"
                ),
            }
        }
        debug!(intention_id = %intention.id(), kind = intention.kind_name(), accepted, "Intention handed off");
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_core::{LeaderboardEntry, LeaderboardName, PlayerId};
    use podium_events::{BroadcastChannel, ChannelEvent, InMemoryDurableLog, InMemoryOutbox};

    fn intention() -> WriteIntention {
        WriteIntention::added(&LeaderboardEntry::new(
            LeaderboardName::global(),
            PlayerId::new("p1").unwrap(),
            3.0,
        ))
    }

    #[tokio::test]
    async fn test_hands_off_to_every_target() {
        let log = Arc::new(InMemoryDurableLog::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        let channel = Arc::new(BroadcastChannel::new(8));
        let mut sub = channel.subscribe(WRITE_BEHIND_TOPIC).await.unwrap();

        let handoff = IntentionHandoff::new(vec![
            HandoffTarget::DurableLog(log.clone()),
            HandoffTarget::broadcast(channel.clone()),
            HandoffTarget::Outbox(outbox.clone()),
        ]);
        assert_eq!(
            handoff.kinds(),
            vec![RelayKind::DurableLog, RelayKind::Broadcast, RelayKind::Broker]
        );

        let sent = intention();
        assert_eq!(handoff.hand_off(&sent).await, 3);
        assert_eq!(log.pending_streams().await.unwrap(), vec![sent.stream_key()]);
        assert_eq!(outbox.pending_count().await, 1);
        assert!(matches!(sub.recv().await, ChannelEvent::Message(_)));
    }

    #[tokio::test]
    async fn test_broadcast_without_listener_still_counts() {
        let handoff =
            IntentionHandoff::new(vec![HandoffTarget::broadcast(Arc::new(BroadcastChannel::new(8)))]);
        assert_eq!(handoff.hand_off(&intention()).await, 1);
    }
}
