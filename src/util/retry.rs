use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::SyncResult;

/// Bounded retry with linear backoff: after failed attempt `n` the caller
/// sleeps `backoff_ms * n` before trying again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Run `op` until it succeeds, returns a non-retryable error, or the policy
/// runs out of attempts. The closure receives the 1-based attempt number.
/// The last error is returned unchanged.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> SyncResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(label, attempt, "upstream attempt");
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "upstream call failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(label, attempt, error = %e, "upstream call gave up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> SyncError {
        SyncError::UpstreamUnavailable {
            url: "http://upstream/p/".into(),
            message: "503 Service Unavailable".into(),
        }
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_ms: 0,
        }
    }

    #[test]
    fn delay_grows_linearly_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = with_retry(no_wait(3), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(unavailable())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_retry(no_wait(4), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(unavailable()) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::UpstreamUnavailable { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let calls = AtomicU32::new(0);
        let err = with_retry(no_wait(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SyncError::Persistence("nope".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "persistence");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
