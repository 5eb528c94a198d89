//! Relay worker
//!
//! Owns the configured relays, spawns one task per relay and stops them all
//! through a shared cancellation handle.

use futures_util::future::join_all;
use podium_core::{CancelHandle, CancelSignal, RelayKind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::RelayReport;
use crate::WriteBehindRelay;

/// The relays a process runs, not yet started.
#[derive(Clone, Default)]
pub struct RelayWorker {
    relays: Vec<Arc<dyn WriteBehindRelay>>,
}

impl RelayWorker {
    pub fn new(relays: Vec<Arc<dyn WriteBehindRelay>>) -> Self {
        Self { relays }
    }

    pub fn with_relay(mut self, relay: Arc<dyn WriteBehindRelay>) -> Self {
        self.relays.push(relay);
        self
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn kinds(&self) -> Vec<RelayKind> {
        self.relays.iter().map(|r| r.kind()).collect()
    }

    /// Spawn every relay on the current runtime.
    pub fn start(self) -> RunningWorker {
        let (handle, signal) = CancelSignal::pair();
        let tasks = self
            .relays
            .into_iter()
            .map(|relay| {
                let signal = signal.clone();
                let name = relay.name();
                info!(relay = %relay.kind(), name = %name, "Starting relay");
                let task = tokio::spawn(async move { relay.run(signal).await });
                (name, task)
            })
            .collect();
        RunningWorker { handle, tasks }
    }
}

impl std::fmt::Debug for RelayWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayWorker")
            .field("relays", &self.kinds())
            .finish()
    }
}

/// Relays that are running. Dropping this without calling
/// [`RunningWorker::shutdown`] leaves the tasks running.
#[derive(Debug)]
pub struct RunningWorker {
    handle: CancelHandle,
    tasks: Vec<(String, JoinHandle<RelayReport>)>,
}

impl RunningWorker {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every relay to stop and wait for them. Relays that panicked
    /// are logged and left out of the reports.
    pub async fn shutdown(self) -> Vec<RelayReport> {
        self.handle.cancel();
        let (names, tasks): (Vec<_>, Vec<_>) = self.tasks.into_iter().unzip();
        let results = join_all(tasks).await;

        let mut reports = Vec::with_capacity(results.len());
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!(name = %name, error = %e, "Relay task failed"),
            }
        }
        info!(stopped = reports.len(), "Relay worker stopped");
        reports
    }
}
