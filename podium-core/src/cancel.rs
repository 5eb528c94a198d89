//! Cancellation signal
//!
//! A thin wrapper over a `tokio::sync::watch` channel carrying `true` once
//! cancellation is requested. Engine operations check it between I/O steps;
//! background relays select on [`CancelSignal::cancelled`] between polls.

use crate::error::{PodiumError, PodiumResult};
use tokio::sync::watch;

/// Requests cancellation. Dropping the handle without calling
/// [`CancelHandle::cancel`] does not cancel anything.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// Observes a [`CancelHandle`].
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// Create a linked handle/signal pair.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    /// A signal that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// Wrap an existing shutdown receiver.
    pub fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> PodiumResult<()> {
        if self.is_cancelled() {
            Err(PodiumError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation is requested. Never resolves for
    /// [`CancelSignal::never`] or when the handle was dropped uncancelled.
    pub async fn cancelled(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_never_is_not_cancelled() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        assert!(signal.check().is_ok());
    }

    #[test]
    fn test_cancel_is_observed_by_every_signal() {
        let (handle, signal) = CancelSignal::pair();
        let second = handle.signal();
        handle.cancel();
        assert!(signal.is_cancelled());
        assert!(second.is_cancelled());
        assert!(matches!(signal.check(), Err(PodiumError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let (handle, mut signal) = CancelSignal::pair();
        let waiter = tokio::spawn(async move { signal.cancelled().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() should resolve")
            .expect("task should not panic");
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (handle, mut signal) = CancelSignal::pair();
        drop(handle);
        let result = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(result.is_err(), "dropped handle must not look like cancellation");
    }
}
