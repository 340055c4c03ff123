//! Explicit waits
//!
//! A [`WaitPolicy`] polls a probe at its [`WaitSpec`] interval until the probe reports
//! ready or the timeout elapses. Every sleep is a full poll interval, so a wait
//! with timeout T and interval P polls at most ⌈T/P⌉+1 times and returns no
//! earlier than T when the condition never holds.

use std::fmt::Debug;
use std::future::Future;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use ezyscribe_common::{ActionFailure, ActionResult, FailureKind, VerificationOutcome, WaitSpec};

/// One probe result
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    /// Condition holds
    Ready(T),
    /// Not yet; carries what was seen, if anything
    Pending(Option<T>),
}

/// Polling wait over a [`WaitSpec`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitPolicy {
    spec: WaitSpec,
}

impl WaitPolicy {
    pub fn new(spec: WaitSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> WaitSpec {
        self.spec
    }

    /// Poll `probe` until it is ready or the budget runs out.
    ///
    /// Probe failures of a pending kind (see [`FailureKind::is_pending`]) count
    /// as "not yet"; any other failure is returned immediately.
    pub async fn wait_until<T, F, Fut>(
        &self,
        description: &str,
        mut probe: F,
    ) -> ActionResult<VerificationOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ActionResult<Observation<T>>>,
    {
        let start = Instant::now();
        let mut polls = 0u32;
        let mut last_observed: Option<T> = None;
        let mut last_failure: Option<ActionFailure> = None;

        loop {
            polls += 1;

            match probe().await {
                Ok(Observation::Ready(value)) => {
                    debug!(
                        condition = description,
                        polls,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Condition met"
                    );
                    return Ok(VerificationOutcome::Matched { value, polls });
                }
                Ok(Observation::Pending(observed)) => {
                    if observed.is_some() {
                        last_observed = observed;
                    }
                }
                Err(failure) if failure.kind.is_pending() => {
                    debug!(condition = description, polls, error = %failure, "Probe not ready");
                    last_failure = Some(failure);
                }
                Err(failure) => {
                    warn!(condition = description, polls, error = %failure, "Probe failed");
                    return Err(failure);
                }
            }

            if start.elapsed() >= self.spec.timeout() {
                warn!(
                    condition = description,
                    polls,
                    timeout_ms = self.spec.timeout().as_millis() as u64,
                    "Timed out waiting"
                );
                return Ok(VerificationOutcome::TimedOut {
                    last_observed,
                    last_failure,
                    polls,
                });
            }

            sleep(self.spec.poll_interval()).await;
        }
    }

    /// Wait for a boolean condition
    pub async fn wait_for<F, Fut>(
        &self,
        description: &str,
        mut condition: F,
    ) -> ActionResult<VerificationOutcome<()>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ActionResult<bool>>,
    {
        self.wait_until(description, || {
            let check = condition();
            async move {
                check.await.map(|holds| {
                    if holds {
                        Observation::Ready(())
                    } else {
                        Observation::Pending(None)
                    }
                })
            }
        })
        .await
    }

    /// Wait for a probe and turn a timeout into a `Timeout` failure
    pub async fn require<T, F, Fut>(&self, description: &str, probe: F) -> ActionResult<T>
    where
        T: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = ActionResult<Observation<T>>>,
    {
        let outcome = self.wait_until(description, probe).await?;
        matched_or_timeout(outcome, description)
    }
}

/// Convert an outcome into the matched value or a `Timeout` failure that keeps
/// the last observation in its message
pub fn matched_or_timeout<T: Debug>(
    outcome: VerificationOutcome<T>,
    description: &str,
) -> ActionResult<T> {
    match outcome {
        VerificationOutcome::Matched { value, .. } => Ok(value),
        VerificationOutcome::TimedOut {
            last_observed,
            last_failure,
            polls,
        } => {
            let mut failure = ActionFailure::new(
                FailureKind::Timeout,
                format!(
                    "timed out waiting for {} after {} polls (last observed: {:?})",
                    description, polls, last_observed
                ),
            );
            if let Some(cause) = last_failure {
                failure = failure.with_cause(cause.to_string());
            }
            Err(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(timeout_ms: u64, poll_ms: u64) -> WaitSpec {
        WaitSpec::from_millis(timeout_ms, poll_ms).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn always_false_times_out_after_budget() {
        let policy = WaitPolicy::new(spec(2000, 100));
        let start = Instant::now();
        let mut calls = 0u32;

        let outcome = policy
            .wait_until("never", || {
                calls += 1;
                async { Ok::<_, ActionFailure>(Observation::<u32>::Pending(Some(7))) }
            })
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(calls <= policy.spec().max_polls());
        assert_eq!(outcome.polls(), calls);
        match outcome {
            VerificationOutcome::TimedOut { last_observed, .. } => {
                assert_eq!(last_observed, Some(7))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_respect_interval() {
        let policy = WaitPolicy::new(spec(1000, 300));
        let start = Instant::now();
        let mut seen = Vec::new();

        let _ = policy
            .wait_until("never", || {
                seen.push(start.elapsed());
                async { Ok::<_, ActionFailure>(Observation::<()>::Pending(None)) }
            })
            .await
            .unwrap();

        for pair in seen.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(300));
        }
        assert!(seen.len() as u32 <= policy.spec().max_polls());
    }

    #[tokio::test(start_paused = true)]
    async fn ready_immediately() {
        let policy = WaitPolicy::default();
        let start = Instant::now();

        let outcome = policy
            .wait_until("ready", || async { Ok(Observation::Ready("ok")) })
            .await
            .unwrap();

        assert_eq!(outcome, VerificationOutcome::Matched { value: "ok", polls: 1 });
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_failures_are_swallowed() {
        let policy = WaitPolicy::new(spec(2000, 100));
        let mut calls = 0u32;

        let outcome = policy
            .wait_until("stale then found", || {
                calls += 1;
                let n = calls;
                async move {
                    match n {
                        1 => Err(ActionFailure::stale("row detached")),
                        2 => Err(ActionFailure::not_found("no rows")),
                        _ => Ok(Observation::Ready(n)),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.matched(), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_pending_failure_propagates() {
        let policy = WaitPolicy::new(spec(2000, 100));
        let mut calls = 0u32;

        let err = policy
            .wait_until("bad locator", || {
                calls += 1;
                async {
                    Err::<Observation<()>, _>(ActionFailure::new(
                        FailureKind::InvalidInput,
                        "invalid selector",
                    ))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, FailureKind::InvalidInput);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_and_require() {
        let policy = WaitPolicy::new(spec(500, 100));
        let mut calls = 0u32;

        let outcome = policy
            .wait_for("third time", || {
                calls += 1;
                let n = calls;
                async move { Ok(n >= 3) }
            })
            .await
            .unwrap();
        assert!(outcome.is_matched());
        assert_eq!(outcome.polls(), 3);

        let err = policy
            .require("never", || async {
                Ok::<_, ActionFailure>(Observation::Pending(Some("light")))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
        assert!(err.message.contains("light"));
    }
}
