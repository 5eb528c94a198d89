//! Bounded exponential backoff around source-of-record writes.

use podium_core::{PodiumError, PodiumResult, RetryConfig};
use std::future::Future;
use tracing::warn;

use crate::metrics::RelayMetrics;

/// The last error of an operation that never succeeded.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub error: PodiumError,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget runs out. Attempt `n` (1-based) is preceded by
/// `retry.delay_for_attempt(n - 1)`.
pub async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    metrics: &RelayMetrics,
    operation: &str,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PodiumResult<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_retryable() && attempts <= retry.max_retries => {
                let delay = retry.delay_for_attempt(attempts);
                warn!(
                    operation,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after failure"
                );
                RelayMetrics::incr(&metrics.retried);
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(RetryFailure { error, attempts }),
        }
    }
}
