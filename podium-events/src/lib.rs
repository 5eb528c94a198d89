//! Podium Events - Intention Transport
//!
//! Everything a write intention travels through on its way from the cache
//! to the source of record: the pub/sub channel, the per-entry durable log,
//! the outbox and broker, and the dead-letter sink.

pub mod broker;
pub mod channel;
pub mod dead_letter;
pub mod durable_log;

pub use broker::{Broker, Delivery, InMemoryBroker, InMemoryOutbox, Outbox, OutboxRecord};
pub use channel::{BroadcastChannel, ChannelEvent, IntentionChannel, Subscription};
pub use dead_letter::{DeadLetter, DeadLetterSink, InMemoryDeadLetters};
pub use durable_log::{DurableLog, InMemoryDurableLog, LogEntry};
