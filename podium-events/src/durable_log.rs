//! Durable intention log
//!
//! One append-only stream per leaderboard entry. The durable-log relay reads
//! only the newest entry of each pending stream, so intermediate writes to the
//! same entry between polls collapse into the last one.

use async_trait::async_trait;
use chrono::Utc;
use podium_core::{PodiumResult, RelayError, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

/// One appended record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Monotonic across the whole log.
    pub id: u64,
    pub stream: String,
    pub payload: String,
    pub appended_at: Timestamp,
}

/// Append-only log of intention payloads keyed by stream.
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Append a payload and return its id.
    async fn append(&self, stream: &str, payload: String) -> PodiumResult<u64>;

    /// Streams holding at least one entry newer than their acknowledged id.
    async fn pending_streams(&self) -> PodiumResult<Vec<String>>;

    /// Newest entry on a stream, acknowledged or not.
    async fn latest(&self, stream: &str) -> PodiumResult<Option<LogEntry>>;

    /// Mark every entry up to and including `up_to` as applied and schedule
    /// them for removal after `ttl`.
    async fn acknowledge(&self, stream: &str, up_to: u64, ttl: Duration) -> PodiumResult<()>;

    /// Drop acknowledged entries whose TTL elapsed. Returns how many entries
    /// were removed.
    async fn purge_expired(&self) -> PodiumResult<usize>;

    /// Entries currently retained on a stream.
    async fn stream_len(&self, stream: &str) -> PodiumResult<usize>;
}

#[derive(Debug, Default)]
struct StreamState {
    entries: Vec<LogEntry>,
    acked: u64,
    expires_at: Option<Instant>,
}

impl StreamState {
    fn is_pending(&self) -> bool {
        self.entries.last().is_some_and(|e| e.id > self.acked)
    }
}

/// In-process [`DurableLog`].
#[derive(Debug, Default)]
pub struct InMemoryDurableLog {
    streams: RwLock<HashMap<String, StreamState>>,
    next_id: AtomicU64,
}

impl InMemoryDurableLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableLog for InMemoryDurableLog {
    async fn append(&self, stream: &str, payload: String) -> PodiumResult<u64> {
        if stream.is_empty() {
            return Err(RelayError::Log {
                stream: stream.to_string(),
                reason: "stream name is empty".to_string(),
            }
            .into());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut streams = self.streams.write().await;
        streams
            .entry(stream.to_string())
            .or_default()
            .entries
            .push(LogEntry {
                id,
                stream: stream.to_string(),
                payload,
                appended_at: Utc::now(),
            });
        trace!(stream, id, "Appended log entry");
        Ok(id)
    }

    async fn pending_streams(&self) -> PodiumResult<Vec<String>> {
        let streams = self.streams.read().await;
        let mut pending: Vec<String> = streams
            .iter()
            .filter(|(_, state)| state.is_pending())
            .map(|(name, _)| name.clone())
            .collect();
        pending.sort();
        Ok(pending)
    }

    async fn latest(&self, stream: &str) -> PodiumResult<Option<LogEntry>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .and_then(|state| state.entries.last().cloned()))
    }

    async fn acknowledge(&self, stream: &str, up_to: u64, ttl: Duration) -> PodiumResult<()> {
        let mut streams = self.streams.write().await;
        let state = streams.get_mut(stream).ok_or_else(|| RelayError::Log {
            stream: stream.to_string(),
            reason: "unknown stream".to_string(),
        })?;
        state.acked = state.acked.max(up_to);
        state.expires_at = Some(Instant::now() + ttl);
        debug!(stream, up_to, ttl_ms = ttl.as_millis() as u64, "Acknowledged stream");
        Ok(())
    }

    async fn purge_expired(&self) -> PodiumResult<usize> {
        let now = Instant::now();
        let mut removed = 0;
        let mut streams = self.streams.write().await;
        streams.retain(|_, state| {
            if state.expires_at.is_some_and(|at| at <= now) {
                let acked = state.acked;
                let before = state.entries.len();
                state.entries.retain(|e| e.id > acked);
                removed += before - state.entries.len();
                state.expires_at = None;
            }
            !state.entries.is_empty()
        });
        if removed > 0 {
            debug!(removed, "Purged expired log entries");
        }
        Ok(removed)
    }

    async fn stream_len(&self, stream: &str) -> PodiumResult<usize> {
        let streams = self.streams.read().await;
        Ok(streams.get(stream).map(|s| s.entries.len()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_is_last_write() {
        let log = InMemoryDurableLog::new();
        log.append("s", "a".to_string()).await.unwrap();
        let second = log.append("s", "b".to_string()).await.unwrap();

        let latest = log.latest("s").await.unwrap().unwrap();
        assert_eq!(latest.id, second);
        assert_eq!(latest.payload, "b");
        assert_eq!(log.pending_streams().await.unwrap(), vec!["s".to_string()]);
    }

    #[tokio::test]
    async fn test_acknowledged_stream_is_not_pending() {
        let log = InMemoryDurableLog::new();
        let id = log.append("s", "a".to_string()).await.unwrap();
        log.acknowledge("s", id, Duration::from_secs(60)).await.unwrap();
        assert!(log.pending_streams().await.unwrap().is_empty());
        assert_eq!(log.stream_len("s").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_write_after_ack_survives_expiry() {
        let log = InMemoryDurableLog::new();
        let first = log.append("s", "a".to_string()).await.unwrap();
        log.acknowledge("s", first, Duration::ZERO).await.unwrap();
        log.append("s", "b".to_string()).await.unwrap();

        assert_eq!(log.purge_expired().await.unwrap(), 1);
        assert_eq!(log.stream_len("s").await.unwrap(), 1);
        assert_eq!(log.pending_streams().await.unwrap(), vec!["s".to_string()]);
        assert_eq!(log.latest("s").await.unwrap().unwrap().payload, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_waits_for_ttl() {
        let log = InMemoryDurableLog::new();
        let id = log.append("s", "a".to_string()).await.unwrap();
        log.acknowledge("s", id, Duration::from_secs(60)).await.unwrap();

        assert_eq!(log.purge_expired().await.unwrap(), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(log.purge_expired().await.unwrap(), 1);
        assert!(log.latest("s").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_stream_fails() {
        let log = InMemoryDurableLog::new();
        let err = log.acknowledge("missing", 1, Duration::ZERO).await.unwrap_err();
        assert_eq!(err.kind(), podium_core::ErrorKind::RelayDeliveryFailure);
    }
}
