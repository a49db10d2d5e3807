//! Fixed-delay retry loops.
//!
//! Polling of receipts and verification status uses a fixed number of
//! attempts with a fixed pause between them; exhausting the budget surfaces
//! the last error seen.

use std::future::Future;
use std::time::Duration;

/// Attempt budget and pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 60,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// No retries, no delay.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Run `op` until it succeeds or the policy is exhausted, returning the last error.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(_) => {
                tracing::debug!("Attempt {}/{} failed, retrying", attempt, attempts);
            }
        }
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}

/// Poll `op` until it yields a value; `Ok(None)` after the last attempt means
/// the value never showed up. Errors abort immediately.
pub async fn poll<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<Option<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(value) = op().await? {
            return Ok(Some(value));
        }
        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Ok(None)
}
