//! Applying intentions to the source of record.

use podium_core::{
    LeaderboardEntry, PodiumResult, RelayError, RelayKind, RetryConfig, WriteIntention,
};
use podium_events::{DeadLetter, DeadLetterSink};
use podium_storage::SourceOfRecord;
use std::sync::Arc;
use tracing::{debug, error};

use crate::metrics::RelayMetrics;
use crate::retry::with_retry;

/// What became of one payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    DeadLettered,
}

/// Merges intentions into the entries the source of record holds.
#[derive(Clone)]
pub struct IntentionApplier {
    source: Arc<dyn SourceOfRecord>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry: RetryConfig,
}

impl IntentionApplier {
    pub fn new(
        source: Arc<dyn SourceOfRecord>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            dead_letters,
            retry,
        }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Read what the store holds, merge the intention over it, upsert.
    pub async fn apply(&self, intention: &WriteIntention) -> PodiumResult<LeaderboardEntry> {
        let payload = intention.payload();
        let existing = self
            .source
            .fetch_one(&payload.leaderboard, &payload.player_id)
            .await?;
        let merged = intention.merge_into(existing);
        self.source.upsert(merged.clone()).await?;
        Ok(merged)
    }

    /// Decode and apply a raw payload, retrying store failures. Anything
    /// that cannot be applied ends up in the dead-letter sink.
    pub async fn deliver(
        &self,
        raw: &str,
        relay: RelayKind,
        metrics: &RelayMetrics,
    ) -> PodiumResult<Outcome> {
        let intention = match WriteIntention::decode(raw) {
            Ok(intention) => intention,
            Err(e) => {
                let reason = RelayError::Malformed {
                    reason: e.to_string(),
                };
                self.dead_letter(raw, relay, reason.to_string(), 1, metrics)
                    .await?;
                return Ok(Outcome::DeadLettered);
            }
        };

        match with_retry(&self.retry, metrics, "upsert", || self.apply(&intention)).await {
            Ok(entry) => {
                RelayMetrics::incr(&metrics.applied);
                debug!(
                    relay = %relay,
                    intention_id = %intention.id(),
                    leaderboard = %entry.leaderboard,
                    player_id = %entry.player_id,
                    "Intention applied"
                );
                Ok(Outcome::Applied)
            }
            Err(failure) => {
                let reason = RelayError::DeliveryFailed {
                    intention: intention.id().to_string(),
                    attempts: failure.attempts,
                    reason: failure.error.to_string(),
                };
                self.dead_letter(raw, relay, reason.to_string(), failure.attempts, metrics)
                    .await?;
                Ok(Outcome::DeadLettered)
            }
        }
    }

    pub(crate) async fn dead_letter(
        &self,
        raw: &str,
        relay: RelayKind,
        reason: String,
        attempts: u32,
        metrics: &RelayMetrics,
    ) -> PodiumResult<()> {
        RelayMetrics::incr(&metrics.dead_lettered);
        let letter = DeadLetter::new(raw, relay, reason, attempts);
        if let Err(e) = self.dead_letters.record(letter).await {
            error!(relay = %relay, error = %e, "Dead-letter sink rejected intention");
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for IntentionApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentionApplier")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
