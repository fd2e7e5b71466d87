use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Errors which may succeed when the operation is attempted again.
pub trait Retryable {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool;
}

/// A fixed number of attempts with a fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: usize,
    backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    pub fn new(attempts: usize, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Total number of attempts.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Pause between attempts.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. The last error is returned.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.attempts && error.is_retryable() => {
                    tracing::debug!(%attempt, %error, "attempt failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::debug!(%attempt, %error, "giving up");
                    return Err(error);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::COS_UPLOAD_ATTEMPTS, crate::COS_RETRY_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum TestError {
        Transient(usize),
        Fatal,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient(_))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_fixed_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3));
        let started = tokio::time::Instant::now();

        let result = policy
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(TestError::Transient(attempt))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_returns_last_error() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(TestError::Transient(attempt)) }
            })
            .await;

        assert_eq!(result, Err(TestError::Transient(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }
}
