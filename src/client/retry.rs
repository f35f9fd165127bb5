//! Exponential backoff retry for transport-level faults.
//!
//! Two policies cover the client lifecycle: `connect` retries without an
//! attempt bound until the endpoint answers, and `execute` gives a query a
//! bounded number of tries. Application-level `errors` responses are a
//! server verdict, not a fault, so the execute policy gives up on them
//! immediately.

use std::time::Duration;

use tracing::warn;

use super::{ClientError, ClientResult};

/// Backoff parameters plus a give-up predicate.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed; `None` retries indefinitely.
    pub max_attempts: Option<u32>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Errors for which retrying is pointless.
    pub give_up: fn(&ClientError) -> bool,
}

impl RetryPolicy {
    /// Session establishment: unbounded attempts, delays capped at 300s.
    pub fn connect() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            give_up: |_| false,
        }
    }

    /// Query execution: 15 attempts, delays capped at 120s, and no retry
    /// at all when the server answered with application errors.
    pub fn execute() -> Self {
        Self {
            max_attempts: Some(15),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            give_up: ClientError::is_application_error,
        }
    }

    /// Delay before the next attempt, doubling from the base and capped.
    /// `attempt` is the 1-based attempt that just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay
            .saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        delay.min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt >= max,
            None => false,
        }
    }
}

/// Run `op` under `policy`, sleeping between failed attempts. The final
/// error is returned unchanged once the policy gives up.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ClientResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if (policy.give_up)(&err) => return Err(err),
            Err(err) if policy.exhausted(attempt) => {
                warn!(%label, attempt, error = %err, "giving up after final attempt");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    %label,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
