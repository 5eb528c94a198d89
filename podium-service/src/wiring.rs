//! Composition root
//!
//! Builds every store, the engine, the configured write strategy and the
//! relays that strategy needs, from one [`PodiumConfig`]. Nothing here is
//! process-global; tests build as many independent instances as they like.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use podium_core::{
    ConfigError, PodiumConfig, PodiumResult, RelayKind, StrategyKind, WRITE_BEHIND_TOPIC,
    WRITE_THROUGH_TOPIC,
};
use podium_engine::{
    CacheAside, HandoffTarget, IntentionHandoff, LeaderboardService, RankingEngine, ReadThrough,
    WriteBehind, WriteStrategy, WriteThrough,
};
use podium_events::{
    BroadcastChannel, InMemoryBroker, InMemoryDeadLetters, InMemoryDurableLog, InMemoryOutbox,
};
use podium_relay::{
    BroadcastRelay, BrokerRelay, DurableLogRelay, IntentionApplier, RelayWorker, WriteBehindRelay,
};
use podium_storage::{EventSourcedStore, InMemoryCache, RelationalStore, SourceOfRecord};
use tracing::info;

/// Which source-of-record adapter backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceBackend {
    #[default]
    Relational,
    EventSourced,
}

impl SourceBackend {
    /// `PODIUM_SOURCE_BACKEND` (relational | event-sourced).
    pub fn from_env() -> Result<Self, ConfigError> {
        std::env::var("PODIUM_SOURCE_BACKEND")
            .ok()
            .map(|raw| raw.parse::<SourceBackend>())
            .transpose()
            .map(Option::unwrap_or_default)
    }

    pub fn open(self) -> Arc<dyn SourceOfRecord> {
        match self {
            SourceBackend::Relational => Arc::new(RelationalStore::new()),
            SourceBackend::EventSourced => Arc::new(EventSourcedStore::new()),
        }
    }
}

impl fmt::Display for SourceBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceBackend::Relational => "relational",
            SourceBackend::EventSourced => "event-sourced",
        })
    }
}

impl FromStr for SourceBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "relational" => Ok(SourceBackend::Relational),
            "event-sourced" | "events" => Ok(SourceBackend::EventSourced),
            other => Err(ConfigError::InvalidValue {
                field: "source_backend".to_string(),
                value: other.to_string(),
                reason: "expected relational or event-sourced".to_string(),
            }),
        }
    }
}

/// A wired service and the relays that keep its source of record current.
pub struct Podium {
    pub service: LeaderboardService,
    pub worker: RelayWorker,
    pub source: Arc<dyn SourceOfRecord>,
    pub channel: Arc<BroadcastChannel>,
    pub dead_letters: Arc<InMemoryDeadLetters>,
}

impl Podium {
    /// Wire everything over `source`. Broadcast relays subscribe here, so
    /// intentions published right after this returns are not lost even if
    /// the worker starts later.
    pub async fn build(config: &PodiumConfig, source: Arc<dyn SourceOfRecord>) -> PodiumResult<Self> {
        config.validate()?;

        let channel = Arc::new(BroadcastChannel::new(config.cache.channel_capacity));
        let cache = Arc::new(InMemoryCache::with_channel(channel.clone()));
        let engine = Arc::new(RankingEngine::new(cache, source.clone(), config.cache.clone()));
        let dead_letters = Arc::new(InMemoryDeadLetters::new());
        let applier = IntentionApplier::new(
            source.clone(),
            dead_letters.clone(),
            config.relay.retry.clone(),
        );

        let mut relays: Vec<Arc<dyn WriteBehindRelay>> = Vec::new();
        let writes = match config.strategy.write_strategy {
            StrategyKind::CacheAside => WriteStrategy::from(CacheAside::new(engine.clone())),
            StrategyKind::WriteThrough => {
                let subscriber =
                    BroadcastRelay::subscribe(channel.as_ref(), WRITE_THROUGH_TOPIC, applier).await?;
                relays.push(Arc::new(subscriber));
                WriteStrategy::from(WriteThrough::new(engine.clone()))
            }
            StrategyKind::WriteBehind => {
                let mut targets = Vec::new();
                for kind in config.relay.kinds() {
                    match kind {
                        RelayKind::DurableLog => {
                            let log = Arc::new(InMemoryDurableLog::new());
                            targets.push(HandoffTarget::DurableLog(log.clone()));
                            relays.push(Arc::new(DurableLogRelay::new(
                                log,
                                applier.clone(),
                                config.relay.log_poll_interval,
                                config.relay.log_entry_ttl,
                            )));
                        }
                        RelayKind::Broadcast => {
                            targets.push(HandoffTarget::broadcast(channel.clone()));
                            relays.push(Arc::new(
                                BroadcastRelay::subscribe(
                                    channel.as_ref(),
                                    WRITE_BEHIND_TOPIC,
                                    applier.clone(),
                                )
                                .await?,
                            ));
                        }
                        RelayKind::Broker => {
                            let outbox = Arc::new(InMemoryOutbox::new());
                            targets.push(HandoffTarget::Outbox(outbox.clone()));
                            relays.push(Arc::new(BrokerRelay::new(
                                outbox,
                                Arc::new(InMemoryBroker::new()),
                                config.relay.broker_queue.clone(),
                                applier.clone(),
                                config.relay.outbox_dispatch_interval,
                            )));
                        }
                    }
                }
                WriteStrategy::from(WriteBehind::new(engine.clone(), IntentionHandoff::new(targets)))
            }
        };

        let service = LeaderboardService::new(ReadThrough::new(engine), writes)
            .with_default_leaderboard(config.strategy.default_leaderboard.clone());
        let worker = RelayWorker::new(relays);

        info!(
            strategy = %service.strategy(),
            default_leaderboard = %service.default_leaderboard(),
            relays = worker.len(),
            "Podium wired"
        );

        Ok(Self {
            service,
            worker,
            source,
            channel,
            dead_letters,
        })
    }
}

impl fmt::Debug for Podium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Podium")
            .field("service", &self.service)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_events::IntentionChannel;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("relational".parse::<SourceBackend>().unwrap(), SourceBackend::Relational);
        assert_eq!(
            "Event_Sourced".parse::<SourceBackend>().unwrap(),
            SourceBackend::EventSourced
        );
        assert!("mongo".parse::<SourceBackend>().is_err());
    }

    #[tokio::test]
    async fn test_cache_aside_needs_no_relays() {
        let podium = Podium::build(&PodiumConfig::default(), SourceBackend::Relational.open())
            .await
            .unwrap();
        assert!(podium.worker.is_empty());
        assert_eq!(podium.service.strategy(), StrategyKind::CacheAside);
    }

    #[tokio::test]
    async fn test_write_behind_builds_one_relay_per_kind() {
        let config = PodiumConfig::default()
            .with_strategy(StrategyKind::WriteBehind)
            .with_relays(vec![
                RelayKind::Broker,
                RelayKind::DurableLog,
                RelayKind::Broadcast,
                RelayKind::Broker,
            ]);
        let podium = Podium::build(&config, SourceBackend::EventSourced.open())
            .await
            .unwrap();
        assert_eq!(
            podium.worker.kinds(),
            vec![RelayKind::DurableLog, RelayKind::Broadcast, RelayKind::Broker]
        );
        assert_eq!(podium.channel.subscriber_count(WRITE_BEHIND_TOPIC), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = PodiumConfig::default()
            .with_strategy(StrategyKind::WriteBehind)
            .with_relays(Vec::new());
        let err = Podium::build(&config, SourceBackend::Relational.open())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), podium_core::ErrorKind::Config);
    }
}
