//! Constants for Podium
//!
//! Defaults shared by configuration, the engine and the relays.

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Leaderboard used when a caller does not name one.
pub const DEFAULT_LEADERBOARD: &str = "global";

/// Maximum length of a leaderboard name.
pub const MAX_LEADERBOARD_NAME_LEN: usize = 64;

/// Maximum length of a player id in bytes.
pub const MAX_PLAYER_ID_LEN: usize = 128;

// ============================================================================
// CACHE
// ============================================================================

/// Rows fetched per page while populating the cache.
pub const DEFAULT_POPULATE_PAGE_SIZE: usize = 1000;

/// Widest rank window a single range query may request.
pub const DEFAULT_MAX_RANGE_WIDTH: u64 = 1000;

/// Capacity of each pub/sub topic buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// CHANNELS
// ============================================================================

/// Topic the write-through transaction publishes to.
pub const WRITE_THROUGH_TOPIC: &str = "leaderboard:write-through";

/// Topic the write-behind broadcast relay listens on.
pub const WRITE_BEHIND_TOPIC: &str = "leaderboard:write-behind";

/// Broker queue consumed by the broker relay.
pub const DEFAULT_BROKER_QUEUE: &str = "leaderboard-intentions";

// ============================================================================
// RELAYS
// ============================================================================

/// Interval between durable-log polls.
pub const DEFAULT_LOG_POLL_INTERVAL_MS: u64 = 1000;

/// How long an applied durable-log stream lingers before expiring.
pub const DEFAULT_LOG_ENTRY_TTL_SECS: u64 = 60;

/// Interval between outbox dispatch passes.
pub const DEFAULT_OUTBOX_DISPATCH_INTERVAL_MS: u64 = 500;

/// Retries after the first failed store write.
pub const DEFAULT_RETRY_MAX: u32 = 3;

/// Delay before the first retry.
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 100;

/// Upper bound on any single retry delay.
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 10_000;

/// Backoff growth factor.
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
