//! Relay counters.

use podium_core::RelayKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept by one relay for its whole lifetime.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Intentions applied to the source of record.
    pub applied: AtomicU64,

    /// Store writes attempted again after a retryable failure.
    pub retried: AtomicU64,

    /// Intentions routed to the dead-letter sink.
    pub dead_lettered: AtomicU64,

    /// Messages lost before the relay saw them (broadcast lag).
    pub dropped: AtomicU64,

    /// Poll or delivery cycles completed.
    pub cycles: AtomicU64,

    /// Cycles that hit an error in the transport itself.
    pub errors: AtomicU64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, kind: RelayKind, name: impl Into<String>) -> RelayReport {
        RelayReport {
            kind,
            name: name.into(),
            applied: self.applied.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a relay's counters, returned when it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub kind: RelayKind,
    /// Topic, queue or log the relay consumed.
    pub name: String,
    pub applied: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
    pub cycles: u64,
    pub errors: u64,
}
