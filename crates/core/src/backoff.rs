//! Quota-aware retry wrapper for completion-service calls.
//!
//! Every call into the completion service goes through [`call_with_backoff`].
//! Only quota/rate errors are retried; anything else propagates on the first
//! failure because repeating a bad request will not fix it.

use crate::llm::CompletionError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// The sleep taken after the n-th failed attempt (0-based).
    fn delay_after(&self, failed_attempts: u32) -> Duration {
        self.initial_delay
            .mul_f64(self.multiplier.powi(failed_attempts as i32))
    }
}

/// Runs `op`, retrying on quota/rate errors with exponentially growing
/// sleeps, up to `policy.max_attempts` total attempts.
pub async fn call_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    mut op: F,
) -> Result<T, CompletionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failed: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err @ CompletionError::RateLimited(_)) => {
                failed += 1;
                if failed as usize >= max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_after(failed - 1);
                warn!(
                    attempt = failed,
                    delay_ms = delay.as_millis() as u64,
                    "completion call hit a rate limit, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
