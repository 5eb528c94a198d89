//! Configuration types

use crate::error::ConfigError;
use crate::identity::LeaderboardName;
use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Prefix of every environment variable read by [`PodiumConfig::from_env`].
pub const ENV_PREFIX: &str = "PODIUM_";

// ============================================================================
// KINDS
// ============================================================================

/// Write path in effect for the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    CacheAside,
    WriteThrough,
    WriteBehind,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::CacheAside => "cache-aside",
            StrategyKind::WriteThrough => "write-through",
            StrategyKind::WriteBehind => "write-behind",
        })
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "cache-aside" => Ok(StrategyKind::CacheAside),
            "write-through" => Ok(StrategyKind::WriteThrough),
            "write-behind" => Ok(StrategyKind::WriteBehind),
            other => Err(ConfigError::InvalidValue {
                field: "write_strategy".to_string(),
                value: other.to_string(),
                reason: "expected cache-aside, write-through or write-behind".to_string(),
            }),
        }
    }
}

/// Write-behind delivery mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayKind {
    /// Per-entry durable log drained by a poller. Last write wins.
    DurableLog,
    /// Fire-and-forget pub/sub. At most once.
    Broadcast,
    /// Outbox plus broker with retry and dead-lettering. At least once.
    Broker,
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayKind::DurableLog => "durable-log",
            RelayKind::Broadcast => "broadcast",
            RelayKind::Broker => "broker",
        })
    }
}

impl FromStr for RelayKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "durable-log" | "log" => Ok(RelayKind::DurableLog),
            "broadcast" | "pubsub" => Ok(RelayKind::Broadcast),
            "broker" => Ok(RelayKind::Broker),
            other => Err(ConfigError::InvalidValue {
                field: "relays".to_string(),
                value: other.to_string(),
                reason: "expected durable-log, broadcast or broker".to_string(),
            }),
        }
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Cache population and query limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Rows per source-of-record page while populating.
    pub populate_page_size: usize,
    /// Widest window a range query may request.
    pub max_range_width: u64,
    /// Buffer size of each pub/sub topic.
    pub channel_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            populate_page_size: DEFAULT_POPULATE_PAGE_SIZE,
            max_range_width: DEFAULT_MAX_RANGE_WIDTH,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Which write path is active and which leaderboard callers get by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub write_strategy: StrategyKind,
    pub default_leaderboard: LeaderboardName,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            write_strategy: StrategyKind::CacheAside,
            default_leaderboard: LeaderboardName::global(),
        }
    }
}

/// Retry configuration for relay store writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_MAX,
            initial_backoff: Duration::from_millis(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_RETRY_MAX_BACKOFF_MS),
            backoff_multiplier: DEFAULT_RETRY_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// No retries at all; the first failure dead-letters.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()).max(0.0))
    }
}

/// Write-behind relay settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relays the worker runs. Order is irrelevant; duplicates are ignored.
    pub enabled: Vec<RelayKind>,
    pub log_poll_interval: Duration,
    pub log_entry_ttl: Duration,
    pub broker_queue: String,
    pub outbox_dispatch_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: vec![RelayKind::DurableLog],
            log_poll_interval: Duration::from_millis(DEFAULT_LOG_POLL_INTERVAL_MS),
            log_entry_ttl: Duration::from_secs(DEFAULT_LOG_ENTRY_TTL_SECS),
            broker_queue: DEFAULT_BROKER_QUEUE.to_string(),
            outbox_dispatch_interval: Duration::from_millis(DEFAULT_OUTBOX_DISPATCH_INTERVAL_MS),
            retry: RetryConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Enabled relays, deduplicated and sorted.
    pub fn kinds(&self) -> Vec<RelayKind> {
        let mut kinds = self.enabled.clone();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PodiumConfig {
    pub cache: CacheConfig,
    pub strategy: StrategyConfig,
    pub relay: RelayConfig,
}

impl PodiumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, kind: StrategyKind) -> Self {
        self.strategy.write_strategy = kind;
        self
    }

    pub fn with_default_leaderboard(mut self, leaderboard: LeaderboardName) -> Self {
        self.strategy.default_leaderboard = leaderboard;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.cache.populate_page_size = page_size;
        self
    }

    pub fn with_relays(mut self, relays: Vec<RelayKind>) -> Self {
        self.relay.enabled = relays;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.relay.retry = retry;
        self
    }

    pub fn with_log_poll_interval(mut self, interval: Duration) -> Self {
        self.relay.log_poll_interval = interval;
        self
    }

    pub fn with_outbox_dispatch_interval(mut self, interval: Duration) -> Self {
        self.relay.outbox_dispatch_interval = interval;
        self
    }

    /// Load from `PODIUM_*` environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Keys carry the `PODIUM_` prefix.
    ///
    /// # Variables
    /// - `PODIUM_DEFAULT_LEADERBOARD` (default: global)
    /// - `PODIUM_POPULATE_PAGE_SIZE` (default: 1000)
    /// - `PODIUM_MAX_RANGE_WIDTH` (default: 1000)
    /// - `PODIUM_CHANNEL_CAPACITY` (default: 1024)
    /// - `PODIUM_WRITE_STRATEGY`: cache-aside | write-through | write-behind
    /// - `PODIUM_RELAYS`: comma separated durable-log, broadcast, broker
    /// - `PODIUM_LOG_POLL_INTERVAL_MS`, `PODIUM_LOG_ENTRY_TTL_SECS`
    /// - `PODIUM_BROKER_QUEUE`, `PODIUM_OUTBOX_DISPATCH_INTERVAL_MS`
    /// - `PODIUM_RETRY_MAX`, `PODIUM_RETRY_INITIAL_BACKOFF_MS`,
    ///   `PODIUM_RETRY_MAX_BACKOFF_MS`, `PODIUM_RETRY_MULTIPLIER`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = PodiumConfig::default();

        if let Some(raw) = get("DEFAULT_LEADERBOARD") {
            config.strategy.default_leaderboard =
                LeaderboardName::new(raw.clone()).map_err(|e| ConfigError::InvalidValue {
                    field: "default_leaderboard".to_string(),
                    value: raw,
                    reason: e.to_string(),
                })?;
        }
        if let Some(raw) = get("WRITE_STRATEGY") {
            config.strategy.write_strategy = raw.parse()?;
        }
        if let Some(raw) = get("RELAYS") {
            config.relay.enabled = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<_, _>>()?;
        }
        if let Some(raw) = get("BROKER_QUEUE") {
            config.relay.broker_queue = raw;
        }

        config.cache.populate_page_size =
            parse_or(&get, "POPULATE_PAGE_SIZE", config.cache.populate_page_size)?;
        config.cache.max_range_width =
            parse_or(&get, "MAX_RANGE_WIDTH", config.cache.max_range_width)?;
        config.cache.channel_capacity =
            parse_or(&get, "CHANNEL_CAPACITY", config.cache.channel_capacity)?;

        config.relay.log_poll_interval = Duration::from_millis(parse_or(
            &get,
            "LOG_POLL_INTERVAL_MS",
            DEFAULT_LOG_POLL_INTERVAL_MS,
        )?);
        config.relay.log_entry_ttl = Duration::from_secs(parse_or(
            &get,
            "LOG_ENTRY_TTL_SECS",
            DEFAULT_LOG_ENTRY_TTL_SECS,
        )?);
        config.relay.outbox_dispatch_interval = Duration::from_millis(parse_or(
            &get,
            "OUTBOX_DISPATCH_INTERVAL_MS",
            DEFAULT_OUTBOX_DISPATCH_INTERVAL_MS,
        )?);

        config.relay.retry = RetryConfig {
            max_retries: parse_or(&get, "RETRY_MAX", DEFAULT_RETRY_MAX)?,
            initial_backoff: Duration::from_millis(parse_or(
                &get,
                "RETRY_INITIAL_BACKOFF_MS",
                DEFAULT_RETRY_INITIAL_BACKOFF_MS,
            )?),
            max_backoff: Duration::from_millis(parse_or(
                &get,
                "RETRY_MAX_BACKOFF_MS",
                DEFAULT_RETRY_MAX_BACKOFF_MS,
            )?),
            backoff_multiplier: parse_or(&get, "RETRY_MULTIPLIER", DEFAULT_RETRY_MULTIPLIER)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.populate_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "populate_page_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.cache.max_range_width == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_range_width".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.cache.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "channel_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.strategy.write_strategy == StrategyKind::WriteBehind && self.relay.enabled.is_empty()
        {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "write_strategy=write-behind".to_string(),
                option_b: "relays=<empty>".to_string(),
            });
        }
        if self.relay.enabled.contains(&RelayKind::Broker) && self.relay.broker_queue.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "broker_queue".to_string(),
            });
        }
        let retry = &self.relay.retry;
        if retry.initial_backoff > retry.max_backoff {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_backoff".to_string(),
                value: format!("{:?}", retry.initial_backoff),
                reason: format!("exceeds max_backoff {:?}", retry.max_backoff),
            });
        }
        if !(retry.backoff_multiplier.is_finite() && retry.backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "retry.backoff_multiplier".to_string(),
                value: retry.backoff_multiplier.to_string(),
                reason: "must be a finite number >= 1.0".to_string(),
            });
        }
        if self.relay.log_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "log_poll_interval".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.relay.outbox_dispatch_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "outbox_dispatch_interval".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_or<T, F>(get: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: name.to_ascii_lowercase(),
            value: raw.clone(),
            reason: "could not be parsed".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PodiumConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.populate_page_size, 1000);
        assert_eq!(config.strategy.default_leaderboard.as_str(), "global");
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        let config = PodiumConfig::from_lookup(lookup(&[
            ("PODIUM_WRITE_STRATEGY", "write_behind"),
            ("PODIUM_RELAYS", "durable-log, broker,broadcast"),
            ("PODIUM_POPULATE_PAGE_SIZE", "250"),
            ("PODIUM_RETRY_MAX", "5"),
            ("PODIUM_DEFAULT_LEADERBOARD", "weekly"),
        ]))
        .unwrap();

        assert_eq!(config.strategy.write_strategy, StrategyKind::WriteBehind);
        assert_eq!(
            config.relay.kinds(),
            vec![RelayKind::DurableLog, RelayKind::Broadcast, RelayKind::Broker]
        );
        assert_eq!(config.cache.populate_page_size, 250);
        assert_eq!(config.relay.retry.max_retries, 5);
        assert_eq!(config.strategy.default_leaderboard.as_str(), "weekly");
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PodiumConfig::from_lookup(lookup(&[("PODIUM_POPULATE_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = PodiumConfig::from_lookup(lookup(&[("PODIUM_WRITE_STRATEGY", "write-around")]))
            .unwrap_err();
        assert!(err.to_string().contains("write-around"));
    }

    #[test]
    fn test_write_behind_requires_a_relay() {
        let config = PodiumConfig::new()
            .with_strategy(StrategyKind::WriteBehind)
            .with_relays(vec![]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn test_inverted_backoff_is_rejected() {
        let config = PodiumConfig::new().with_retry(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delay_for_attempt_is_bounded_exponential() {
        let retry = RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(30), Duration::from_millis(500));
    }
}
