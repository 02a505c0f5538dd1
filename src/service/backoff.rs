use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::IndexerConfig;
use crate::indexer::IndexerError;

/// Timeout and retry budget for indexer calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            max_delay: Duration::from_millis(config.backoff_max_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Exponential delay before retry `attempt` (1-based), capped, with up to
    /// 50% random jitter added
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)));
        let capped = exp.min(self.max_delay);

        let jitter_ms = capped.as_millis() as u64 / 2;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };

        capped + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IndexerConfig::default())
    }
}

/// Run `operation` under the policy's timeout, retrying retryable failures
/// with backoff. Returns the last error once the budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, IndexerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IndexerError>>,
{
    let mut attempt = 0;

    loop {
        let result = match timeout(policy.request_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(IndexerError::Timeout),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay(attempt);
                warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    what, err, attempt, policy.max_retries, delay
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
