//! Dead-letter sink for intentions that cannot be applied.

use async_trait::async_trait;
use chrono::Utc;
use podium_core::{PodiumResult, RelayKind, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::error;

/// A poison or repeatedly failing intention, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Raw payload as received; may not decode.
    pub payload: String,
    pub relay: RelayKind,
    pub reason: String,
    pub attempts: u32,
    pub failed_at: Timestamp,
}

impl DeadLetter {
    pub fn new(
        payload: impl Into<String>,
        relay: RelayKind,
        reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            payload: payload.into(),
            relay,
            reason: reason.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: DeadLetter) -> PodiumResult<()>;

    async fn letters(&self) -> PodiumResult<Vec<DeadLetter>>;
}

/// In-process [`DeadLetterSink`].
#[derive(Debug, Default)]
pub struct InMemoryDeadLetters {
    letters: RwLock<Vec<DeadLetter>>,
}

impl InMemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.letters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.letters.read().await.is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetters {
    async fn record(&self, letter: DeadLetter) -> PodiumResult<()> {
        error!(
            relay = ?letter.relay,
            attempts = letter.attempts,
            reason = %letter.reason,
            "Intention dead-lettered"
        );
        self.letters.write().await.push(letter);
        Ok(())
    }

    async fn letters(&self) -> PodiumResult<Vec<DeadLetter>> {
        Ok(self.letters.read().await.clone())
    }
}
