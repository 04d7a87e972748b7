//! Exponential backoff for registry and artifact requests

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use tofu_core::types::DEFAULT_MAX_RETRIES;

use crate::SyncResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    /// Run an operation, retrying only errors that are retryable
    pub async fn run<F, Fut, T>(&self, what: &str, operation: F) -> SyncResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) if attempt < self.max_retries && error.is_retryable() => {
                    let delay = self.delay_for(attempt);
                    attempt += 1;
                    debug!(
                        "Retrying {} (attempt {}/{}) in {:?}: {}",
                        what, attempt, self.max_retries, delay, error
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tofu_core::error::TofuError;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TofuError::Fetch {
                        url: "https://host".to_string(),
                        reason: "status 502".to_string(),
                        status: Some(502),
                    })
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_not_found() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = fast_policy(3)
            .run("missing", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TofuError::NotFound {
                    what: "a/b/c".to_string(),
                })
            })
            .await;

        assert!(matches!(result, Err(TofuError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = fast_policy(2)
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TofuError::Network {
                    message: "connection refused".to_string(),
                    source: None,
                })
            })
            .await;

        assert!(matches!(result, Err(TofuError::Network { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
