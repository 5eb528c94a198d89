//! Podium Relay - Write-Behind Delivery
//!
//! Background workers that carry write intentions from their transport to
//! the source of record:
//!
//! | Relay | Transport | Delivery |
//! |-------|-----------|----------|
//! | [`DurableLogRelay`] | per-entry durable log | latest write per entry, acknowledged with TTL |
//! | [`BroadcastRelay`] | pub/sub topic | best effort, lost while unsubscribed |
//! | [`BrokerRelay`] | outbox + broker queue | at least once, nack and redeliver |
//!
//! Every relay applies intentions through an [`IntentionApplier`], which
//! merges them into what the store already holds and routes anything
//! undeliverable to the dead-letter sink.

use async_trait::async_trait;
use podium_core::{CancelSignal, RelayKind};

pub mod apply;
pub mod broadcast;
pub mod broker;
pub mod durable_log;
pub mod metrics;
pub mod retry;
pub mod worker;

pub use apply::{IntentionApplier, Outcome};
pub use broadcast::BroadcastRelay;
pub use broker::BrokerRelay;
pub use durable_log::DurableLogRelay;
pub use metrics::{RelayMetrics, RelayReport};
pub use retry::{with_retry, RetryFailure};
pub use worker::{RelayWorker, RunningWorker};

/// A long-running consumer of one intention transport.
#[async_trait]
pub trait WriteBehindRelay: Send + Sync {
    fn kind(&self) -> RelayKind;

    /// Topic, queue or log this relay consumes.
    fn name(&self) -> String;

    /// Run until `shutdown` fires, then report the relay's counters.
    async fn run(&self, shutdown: CancelSignal) -> RelayReport;
}
