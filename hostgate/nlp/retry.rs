use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::provider::ProviderError;

/// Upper bound on a server-requested `Retry-After` wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Which provider failures are retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryScope {
    /// Every error is retried identically.
    Any,
    /// Only errors reporting [`ProviderError::is_transient`].
    #[default]
    Transient,
}

/// Bounded exponential backoff around provider calls.
///
/// After failed attempt `k` (0-indexed) the next one waits
/// `base_delay * 2^k`. No delay follows the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    scope: RetryScope,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), RetryScope::Transient)
    }
}

impl RetryPolicy {
    /// Creates a policy; at least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, scope: RetryScope) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            scope,
        }
    }

    /// Attempt budget.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Configured scope.
    #[must_use]
    pub const fn scope(&self) -> RetryScope {
        self.scope
    }

    /// Delay inserted after failed attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.checked_pow(attempt).unwrap_or(u32::MAX))
    }

    /// Delay before the attempt following failed attempt `attempt`.
    ///
    /// A rate-limit reply with `Retry-After` waits at least that long,
    /// capped at [`MAX_RETRY_AFTER`].
    #[must_use]
    pub fn delay_after(&self, attempt: u32, err: &ProviderError) -> Duration {
        let backoff = self.delay_for(attempt);
        match err {
            ProviderError::RateLimited {
                retry_after_secs: Some(secs),
            } => backoff.max(Duration::from_secs(*secs).min(MAX_RETRY_AFTER)),
            _ => backoff,
        }
    }

    /// Whether `err` is eligible for another attempt under this scope.
    #[must_use]
    pub const fn should_retry(&self, err: &ProviderError) -> bool {
        match self.scope {
            RetryScope::Any => true,
            RetryScope::Transient => err.is_transient(),
        }
    }

    /// Runs `op` until it succeeds, the error is not retryable, or the budget
    /// is spent. `op` receives the 0-indexed attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, ProviderError>> + Send,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let exhausted = attempt + 1 >= self.max_attempts;
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "provider call failed"
                    );
                    if exhausted || !self.should_retry(&err) {
                        return Err(err);
                    }
                    sleep(self.delay_after(attempt, &err)).await;
                    attempt += 1;
                }
            }
        }
    }
}
