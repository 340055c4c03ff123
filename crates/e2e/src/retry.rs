//! Bounded retries for flaky UI interactions
//!
//! Operations passed to [`RetryExecutor::execute`] may run more than once.
//! Reads are assumed at-least-once safe, and clicks are assumed idempotent for
//! a given UI state (applying an already-applied filter re-confirms it). The
//! executor does not check this.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use ezyscribe_common::{ActionResult, RetrySpec};

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The value, or the last failure annotated with the attempt count
    pub result: ActionResult<T>,
    /// Attempts made
    pub attempts: u32,
    /// Total time spent, delays included
    pub elapsed: Duration,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs an operation under a [`RetrySpec`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    spec: RetrySpec,
}

impl RetryExecutor {
    pub fn new(spec: RetrySpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &RetrySpec {
        &self.spec
    }

    /// Run `operation` until it succeeds, fails with a non-retryable kind, or
    /// exhausts `max_attempts`
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ActionResult<T>>,
    {
        let start = Instant::now();
        let max_attempts = self.spec.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempts = attempt, "Operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
                Err(failure) if failure.is_fatal() || !self.spec.is_retryable(failure.kind) => {
                    debug!(attempt, kind = %failure.kind, "Failure is not retryable");
                    return RetryOutcome {
                        result: Err(failure.with_attempts(attempt)),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
                Err(failure) if attempt >= max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %failure,
                        "Operation failed after all retry attempts"
                    );
                    return RetryOutcome {
                        result: Err(failure.with_attempts(attempt)),
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    };
                }
                Err(failure) => {
                    debug!(
                        attempt,
                        delay_ms = self.spec.delay_between().as_millis() as u64,
                        error = %failure,
                        "Retrying operation after failure"
                    );
                    sleep(self.spec.delay_between()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ezyscribe_common::{ActionFailure, FailureKind};

    fn executor(max_attempts: u32) -> RetryExecutor {
        let spec = RetrySpec::transient(max_attempts, Duration::from_millis(500)).unwrap();
        RetryExecutor::new(spec)
    }

    #[tokio::test(start_paused = true)]
    async fn always_retryable_runs_max_attempts() {
        for n in 1..=5 {
            let mut calls = 0u32;
            let outcome = executor(n)
                .execute(|| {
                    calls += 1;
                    async { Err::<(), _>(ActionFailure::stale("detached")) }
                })
                .await;

            assert_eq!(calls, n);
            assert_eq!(outcome.attempts, n);
            let failure = outcome.result.unwrap_err();
            assert_eq!(failure.kind, FailureKind::StaleReference);
            assert_eq!(failure.attempts, n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_runs_once() {
        let mut calls = 0u32;
        let outcome = executor(3)
            .execute(|| {
                calls += 1;
                async { Err::<(), _>(ActionFailure::not_found("no sort button")) }
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert_eq!(outcome.result.unwrap_err().kind, FailureKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_twice_then_success() {
        let mut calls = 0u32;
        let outcome = executor(3)
            .execute(|| {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(ActionFailure::stale("menu re-rendered"))
                    } else {
                        Ok("menu open")
                    }
                }
            })
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap(), "menu open");
        // two delays between three attempts
        assert!(outcome.elapsed >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_runs_once() {
        let spec = RetrySpec::default()
            .with_retryable(FailureKind::SessionLost)
            .with_retryable(FailureKind::InvalidConfig);
        let mut calls = 0u32;
        let outcome = RetryExecutor::new(spec)
            .execute(|| {
                calls += 1;
                async {
                    Err::<(), _>(ActionFailure::new(FailureKind::SessionLost, "session deleted"))
                }
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
        assert!(outcome.result.unwrap_err().is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn once_never_retries() {
        let mut calls = 0u32;
        let outcome = RetryExecutor::new(RetrySpec::once())
            .execute(|| {
                calls += 1;
                async { Err::<(), _>(ActionFailure::stale("detached")) }
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts, 1);
    }
}
