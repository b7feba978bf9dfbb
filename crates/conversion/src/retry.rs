//! Bounded retries for upstream reads
//!
//! Only side-effect free calls go through here. Certificate delete and
//! create are issued exactly once.

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::error::{ConversionError, ConversionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// First backoff delay; each further delay doubles it
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> {
        let factor = u64::try_from(self.base_delay.as_millis() / 2)
            .unwrap_or(u64::MAX)
            .max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Run a read, retrying while it fails with a retryable error
pub async fn retry_read<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    action: F,
) -> ConversionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConversionResult<T>>,
{
    RetryIf::start(
        policy.delays(),
        action,
        |err: &ConversionError| {
            let retry = err.is_retryable();
            if retry {
                tracing::warn!(
                    operation = operation,
                    error = %err,
                    "Upstream read failed, retrying"
                );
            }
            retry
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_read(&fast(3), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ConversionError::UpstreamUnavailable("503".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ConversionResult<()> = retry_read(&fast(3), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConversionError::UpstreamUnavailable("timeout".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ConversionResult<()> = retry_read(&fast(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ConversionError::CertificateNotFound {
                code: "invalid_certificate".into(),
                message: "not found".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_none_policy_has_no_delays() {
        assert_eq!(RetryPolicy::none().delays().count(), 0);
        assert_eq!(RetryPolicy::default().delays().count(), 2);
    }
}
