//! Retry envelope around a single worker call: up to `retry_attempts + 1`
//! tries, delay before attempt k (k >= 1) is `retry_delay * 2^(k-1)`.
//! Retries stop immediately on a non-retryable error or on cancellation.
//!
//! Grounded on the teacher's `resilience::retry::retry_with_backoff`,
//! adapted to `CoreError` and to the cancellation token threaded through
//! every suspension point.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cancellation::CancellationToken;
use crate::config::SupervisorConfig;
use crate::error::{CoreError, CoreResult};

/// Run `op` under the retry envelope. `op` is retried while the error is
/// retryable and attempts remain; cancellation aborts immediately and
/// surfaces as `CoreError::Cancelled` rather than continuing to retry.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &SupervisorConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> (CoreResult<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut delay = config.retry_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return (Err(CoreError::Cancelled), attempt);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            r = op() => r,
        };

        match result {
            Ok(v) => return (Ok(v), attempt),
            Err(CoreError::Cancelled) => return (Err(CoreError::Cancelled), attempt),
            Err(e) if !e.is_retryable() => return (Err(e), attempt),
            Err(e) => {
                if attempt > config.retry_attempts {
                    warn!(attempts = attempt, error = %e, "retry envelope exhausted");
                    return (Err(e), attempt);
                }
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying after backoff");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (Err(CoreError::Cancelled), attempt),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = delay.saturating_mul(2).min(Duration::from_secs(60));
            }
        }
    }
}
