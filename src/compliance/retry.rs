//! Bounded retry with exponential backoff
//!
//! The sleep function is injected so tests can run the schedule without
//! waiting on the clock.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Sleeps for the given duration; swapped out in tests
pub type Sleeper = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sleeper backed by the tokio timer
pub fn tokio_sleeper() -> Sleeper {
    Arc::new(|delay| Box::pin(tokio::time::sleep(delay)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Last error of a retried operation and how many attempts were made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    pub error: E,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. Returns the value and the attempts used.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &Sleeper,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<(T, u32), RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if attempt < max_attempts && is_retryable(&error) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!("Attempt {} failed, retrying in {:?}", attempt, delay);
                sleeper(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryError {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn recording_sleeper() -> (Sleeper, Arc<Mutex<Vec<Duration>>>) {
        let slept = Arc::new(Mutex::new(Vec::new()));
        let log = slept.clone();
        let sleeper: Sleeper = Arc::new(move |d| {
            log.lock().unwrap().push(d);
            Box::pin(async {})
        });
        (sleeper, slept)
    }

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (sleeper, slept) = recording_sleeper();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = retry_with_backoff(
            &RetryPolicy::default(),
            &sleeper,
            |_: &&str| true,
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("throttled")
                } else {
                    Ok("done")
                }
            },
        )
        .await;

        assert_eq!(result, Ok(("done", 3)));
        assert_eq!(
            *slept.lock().unwrap(),
            vec![Duration::from_millis(500), Duration::from_millis(1_000)]
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (sleeper, slept) = recording_sleeper();
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };

        let result: Result<((), u32), _> =
            retry_with_backoff(&policy, &sleeper, |_: &&str| true, || async { Err("busy") })
                .await;

        assert_eq!(
            result,
            Err(RetryError {
                error: "busy",
                attempts: 3
            })
        );
        assert_eq!(slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let (sleeper, slept) = recording_sleeper();

        let result: Result<((), u32), _> = retry_with_backoff(
            &RetryPolicy::default(),
            &sleeper,
            |e: &&str| *e != "forbidden",
            || async { Err("forbidden") },
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert!(slept.lock().unwrap().is_empty());
    }
}
