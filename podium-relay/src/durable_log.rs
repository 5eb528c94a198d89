//! Durable-log relay
//!
//! Polls the per-entry intention streams. Only the newest entry of each
//! pending stream is applied; anything older on the same stream was
//! superseded and is acknowledged with it. Acknowledged entries expire
//! after the configured TTL.

use async_trait::async_trait;
use podium_core::{CancelSignal, PodiumResult, RelayKind};
use podium_events::DurableLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::apply::{IntentionApplier, Outcome};
use crate::metrics::{RelayMetrics, RelayReport};
use crate::WriteBehindRelay;

pub struct DurableLogRelay {
    log: Arc<dyn DurableLog>,
    applier: IntentionApplier,
    poll_interval: Duration,
    entry_ttl: Duration,
    metrics: RelayMetrics,
}

impl DurableLogRelay {
    pub fn new(
        log: Arc<dyn DurableLog>,
        applier: IntentionApplier,
        poll_interval: Duration,
        entry_ttl: Duration,
    ) -> Self {
        Self {
            log,
            applier,
            poll_interval,
            entry_ttl,
            metrics: RelayMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// One pass over every pending stream. Returns how many streams were
    /// handled.
    pub async fn poll_once(&self) -> PodiumResult<usize> {
        let streams = self.log.pending_streams().await?;
        let mut handled = 0;
        for stream in &streams {
            let Some(latest) = self.log.latest(stream).await? else {
                continue;
            };
            let outcome = self
                .applier
                .deliver(&latest.payload, RelayKind::DurableLog, &self.metrics)
                .await?;
            if outcome == Outcome::DeadLettered {
                warn!(stream = %stream, id = latest.id, "Stream head dead-lettered");
            }
            self.log
                .acknowledge(stream, latest.id, self.entry_ttl)
                .await?;
            handled += 1;
        }
        let purged = self.log.purge_expired().await?;
        RelayMetrics::incr(&self.metrics.cycles);
        if handled > 0 || purged > 0 {
            debug!(streams = handled, purged, "Durable log poll complete");
        }
        Ok(handled)
    }
}

#[async_trait]
impl WriteBehindRelay for DurableLogRelay {
    fn kind(&self) -> RelayKind {
        RelayKind::DurableLog
    }

    fn name(&self) -> String {
        "durable-log".to_string()
    }

    async fn run(&self, mut shutdown: CancelSignal) -> RelayReport {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            entry_ttl_secs = self.entry_ttl.as_secs(),
            "Durable log relay started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        RelayMetrics::incr(&self.metrics.errors);
                        warn!(error = %e, "Durable log poll failed");
                    }
                }
            }
        }

        let report = self.metrics.report(self.kind(), self.name());
        info!(applied = report.applied, dead_lettered = report.dead_lettered, "Durable log relay stopped");
        report
    }
}

impl std::fmt::Debug for DurableLogRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLogRelay")
            .field("poll_interval", &self.poll_interval)
            .field("entry_ttl", &self.entry_ttl)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_core::{LeaderboardEntry, LeaderboardName, PlayerId, RetryConfig, WriteIntention};
    use podium_events::{InMemoryDeadLetters, InMemoryDurableLog};
    use podium_storage::{RelationalStore, SourceOfRecord};
    use std::sync::atomic::Ordering;

    fn intention(id: &str, score: f64) -> WriteIntention {
        WriteIntention::add_or_updated(&LeaderboardEntry::new(
            LeaderboardName::global(),
            PlayerId::new(id).unwrap(),
            score,
        ))
    }

    fn relay(
        ttl: Duration,
    ) -> (Arc<InMemoryDurableLog>, Arc<RelationalStore>, Arc<InMemoryDeadLetters>, DurableLogRelay) {
        let log = Arc::new(InMemoryDurableLog::new());
        let source = Arc::new(RelationalStore::new());
        let letters = Arc::new(InMemoryDeadLetters::new());
        let applier = IntentionApplier::new(source.clone(), letters.clone(), RetryConfig::none());
        let relay = DurableLogRelay::new(log.clone(), applier, Duration::from_millis(10), ttl);
        (log, source, letters, relay)
    }

    async fn append(log: &InMemoryDurableLog, intention: &WriteIntention) {
        log.append(&intention.stream_key(), intention.encode().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_only_latest_write_per_stream_is_applied() {
        let (log, source, _, relay) = relay(Duration::from_secs(60));
        append(&log, &intention("a", 1.0)).await;
        append(&log, &intention("a", 2.0)).await;
        append(&log, &intention("b", 9.0)).await;

        assert_eq!(relay.poll_once().await.unwrap(), 2);
        let a = source
            .fetch_one(&LeaderboardName::global(), &PlayerId::new("a").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.score, 2.0);
        assert_eq!(relay.metrics().applied.load(Ordering::Relaxed), 2);

        assert!(log.pending_streams().await.unwrap().is_empty());
        assert_eq!(relay.poll_once().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledged_entries_expire_after_ttl() {
        let (log, _, _, relay) = relay(Duration::from_secs(5));
        let first = intention("a", 1.0);
        append(&log, &first).await;
        relay.poll_once().await.unwrap();
        assert_eq!(log.stream_len(&first.stream_key()).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        relay.poll_once().await.unwrap();
        assert_eq!(log.stream_len(&first.stream_key()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poison_head_is_dead_lettered_and_acknowledged() {
        let (log, _, letters, relay) = relay(Duration::from_secs(60));
        log.append("intentions:global:entry:x", "garbage".to_string())
            .await
            .unwrap();

        assert_eq!(relay.poll_once().await.unwrap(), 1);
        assert_eq!(letters.len().await, 1);
        assert!(log.pending_streams().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (log, source, _, relay) = relay(Duration::from_secs(60));
        let relay = Arc::new(relay);
        append(&log, &intention("a", 3.0)).await;

        let (handle, signal) = CancelSignal::pair();
        let task = tokio::spawn({
            let relay = relay.clone();
            async move { relay.run(signal).await }
        });
        for _ in 0..100 {
            if source.count(&LeaderboardName::global()).await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.cancel();
        let report = task.await.unwrap();
        assert_eq!(report.kind, RelayKind::DurableLog);
        assert_eq!(report.applied, 1);
    }
}
