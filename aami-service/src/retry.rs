//! Shared exponential-backoff retry envelope
//!
//! Generalizes the backoff loop the database pool connector has always used (fixed
//! multiplier of 2 applied to a configured base delay) into something the metrics-engine
//! client (§4.4) can reuse instead of re-deriving it.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Parameters for an exponential-backoff retry loop.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(max_attempts: usize, initial_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(self.initial_delay.as_secs_f64() * factor)
    }
}

/// Runs `op` up to `policy.max_attempts` times with exponential backoff between attempts.
///
/// Honors `cancel`: if the token is cancelled while sleeping between attempts, the loop
/// stops immediately and returns the last observed error rather than waiting out the
/// remaining backoff.
pub async fn with_backoff<T, F, Fut>(policy: BackoffPolicy, cancel: &CancellationToken, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt as usize >= policy.max_attempts {
                    return Err(Error::RetryExhausted(format!(
                        "giving up after {attempt} attempt(s): {err}"
                    )));
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(attempt, ?delay, error = %err, "attempt failed, retrying");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(Error::RetryExhausted(format!(
                            "cancelled while backing off after attempt {attempt}: {err}"
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_succeeds_on_first_attempt() {
        let policy = BackoffPolicy::new(3, Duration::from_millis(1), 2.0);
        let cancel = CancellationToken::new();
        let result: Result<i32> = with_backoff(policy, &cancel, || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let policy = BackoffPolicy::new(5, Duration::from_millis(1), 2.0);
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let result: Result<&str> = with_backoff(policy, &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::ConnectionFailed("not yet".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let policy = BackoffPolicy::new(2, Duration::from_millis(1), 2.0);
        let cancel = CancellationToken::new();

        let result: Result<()> =
            with_backoff(policy, &cancel, || async { Err(Error::ConnectionFailed("down".into())) }).await;

        assert!(matches!(result, Err(Error::RetryExhausted(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_retry_loop() {
        let policy = BackoffPolicy::new(10, Duration::from_secs(60), 2.0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<()> =
            with_backoff(policy, &cancel, || async { Err(Error::ConnectionFailed("down".into())) }).await;

        assert!(matches!(result, Err(Error::RetryExhausted(_))));
    }
}
