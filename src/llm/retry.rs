use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::UpstreamError;

/// Timeout and retry policy for hosted-model calls.
///
/// Each attempt is bounded by `timeout`. Only transient failures are retried
/// (see `UpstreamError::is_transient`); a timeout is reported as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 1,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1)
    /// plus up to half of base as jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let jitter_ms = (self.base_delay.as_millis() / 2) as u64;
        let jitter = if jitter_ms == 0 { 0 } else { rand::thread_rng().gen_range(0..=jitter_ms) };
        exp + Duration::from_millis(jitter)
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut attempt = 0u32;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(UpstreamError::Timeout(self.timeout)),
            };
            match result {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(target: "llm", attempt, delay_ms = delay.as_millis() as u64, error = %e, "model_call_retry");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
