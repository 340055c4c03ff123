//! Scenario execution
//!
//! A [`Scenario`] is an ordered list of steps with a single pass/fail outcome.
//! The [`ScenarioRunner`] executes steps strictly in order, wrapping each
//! action in its retry spec and, when the step verifies its effect, polling
//! the action through an [`EventualConsistencyVerifier`] until the predicate
//! holds. The first failing step stops the scenario; the report always covers
//! every attempted step.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ezyscribe_common::{
    ActionFailure, ActionResult, ReportSink, RetrySpec, Role, ScenarioReport, StepOutcome,
    StepRecord, VerificationOutcome, WaitSpec,
};

use crate::error::{E2eError, E2eResult};
use crate::retry::RetryExecutor;
use crate::verify::EventualConsistencyVerifier;

type Action<T> = Box<dyn Fn() -> BoxFuture<'static, ActionResult<T>> + Send + Sync>;
type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Verification<T> {
    predicate: Predicate<T>,
    spec: WaitSpec,
}

/// One step: an action, optionally retried, optionally verified
///
/// When a step verifies, its action is the read being polled, so it runs
/// once per poll and must be safe to repeat.
pub struct ScenarioStep<T> {
    name: String,
    action: Action<T>,
    retry: Option<RetrySpec>,
    verify: Option<Verification<T>>,
}

impl<T> ScenarioStep<T>
where
    T: Debug + Send + Sync + 'static,
{
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(move || action().boxed()),
            retry: None,
            verify: None,
        }
    }

    pub fn with_retry(mut self, spec: RetrySpec) -> Self {
        self.retry = Some(spec);
        self
    }

    /// Poll the action until `predicate` holds on its value
    pub fn verify<P>(mut self, predicate: P, spec: WaitSpec) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.verify = Some(Verification {
            predicate: Box::new(predicate),
            spec,
        });
        self
    }

    fn executor(&self) -> RetryExecutor {
        RetryExecutor::new(self.retry.clone().unwrap_or_else(RetrySpec::once))
    }

    async fn run_plain(&self) -> (StepOutcome, u32, Option<u32>, Option<ActionFailure>) {
        let outcome = self.executor().execute(|| (self.action)()).await;
        match outcome.result {
            Ok(value) => (
                StepOutcome::Passed {
                    observed: Some(format!("{:?}", value)),
                },
                outcome.attempts,
                None,
                None,
            ),
            Err(failure) => {
                let step_outcome = StepOutcome::failed(&failure);
                (step_outcome, outcome.attempts, None, Some(failure))
            }
        }
    }

    async fn run_verified(
        &self,
        verification: &Verification<T>,
    ) -> (StepOutcome, u32, Option<u32>, Option<ActionFailure>) {
        let executor = self.executor();
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let action = &self.action;
        let verifier = EventualConsistencyVerifier::new(verification.spec);

        let verified = verifier
            .verify(
                &self.name,
                || {
                    let retried = executor.execute(move || action());
                    async move {
                        let outcome = retried.await;
                        attempts.fetch_add(outcome.attempts, Ordering::Relaxed);
                        outcome.result
                    }
                },
                |value: &T| (verification.predicate)(value),
            )
            .await;
        let attempts = counter.load(Ordering::Relaxed);

        match verified {
            Ok(VerificationOutcome::Matched { value, polls }) => (
                StepOutcome::Passed {
                    observed: Some(format!("{:?}", value)),
                },
                attempts,
                Some(polls),
                None,
            ),
            Ok(VerificationOutcome::TimedOut {
                last_observed,
                last_failure,
                polls,
            }) => (
                StepOutcome::VerificationTimedOut {
                    last_observed: last_observed.map(|v| format!("{:?}", v)),
                    last_failure: last_failure.map(|f| f.to_string()),
                },
                attempts,
                Some(polls),
                None,
            ),
            Err(failure) => (StepOutcome::failed(&failure), attempts, None, Some(failure)),
        }
    }
}

/// Result of executing one step
#[derive(Debug)]
pub struct StepExecution {
    pub record: StepRecord,
    /// The failure behind a `Failed` outcome
    pub failure: Option<ActionFailure>,
}

/// Type-erased step
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self) -> StepExecution;
}

#[async_trait]
impl<T> Step for ScenarioStep<T>
where
    T: Debug + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> StepExecution {
        let start = Instant::now();
        let (outcome, attempts, verification_polls, failure) = match &self.verify {
            Some(verification) => self.run_verified(verification).await,
            None => self.run_plain().await,
        };

        StepExecution {
            record: StepRecord {
                name: self.name.clone(),
                outcome,
                attempts,
                verification_polls,
                duration_ms: start.elapsed().as_millis() as u64,
            },
            failure,
        }
    }
}

/// A named, tagged sequence of steps
pub struct Scenario {
    name: String,
    role: Option<Role>,
    tags: Vec<String>,
    steps: Vec<Box<dyn Step>>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: None,
            tags: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Append a step
    pub fn step<T>(mut self, step: ScenarioStep<T>) -> Self
    where
        T: Debug + Send + Sync + 'static,
    {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push_step(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("tags", &self.tags)
            .field("steps", &self.step_names())
            .finish()
    }
}

/// Executes scenarios and hands finished reports to the sinks
#[derive(Default)]
pub struct ScenarioRunner {
    sinks: Vec<Arc<dyn ReportSink>>,
    cancel: CancellationToken,
}

impl ScenarioRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Share a cancellation token, checked between steps
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run `scenario` to completion, first failure or cancellation.
    ///
    /// Step failures are reported in the returned [`ScenarioReport`]. A fatal
    /// failure returns [`E2eError::Aborted`], which still carries the partial
    /// report; the report is submitted to the sinks either way.
    pub async fn run(&self, scenario: &Scenario) -> E2eResult<ScenarioReport> {
        let mut builder = ScenarioReport::builder(scenario.name());
        if let Some(role) = scenario.role() {
            builder = builder.role(role.as_str());
        }
        info!(scenario = %scenario.name(), steps = scenario.len(), "Running scenario");

        for step in &scenario.steps {
            if self.cancel.is_cancelled() {
                warn!(scenario = %scenario.name(), next_step = %step.name(), "Scenario cancelled");
                builder.mark_cancelled();
                break;
            }

            let execution = step.execute().await;
            let passed = execution.record.outcome.is_passed();
            let record = execution.record;

            if passed {
                info!(
                    scenario = %scenario.name(),
                    step = %record.name,
                    attempts = record.attempts,
                    duration_ms = record.duration_ms,
                    "Step passed"
                );
            } else {
                error!(
                    scenario = %scenario.name(),
                    step = %record.name,
                    attempts = record.attempts,
                    outcome = ?record.outcome,
                    "Step failed"
                );
            }
            builder.push(record);

            if let Some(failure) = execution.failure.filter(|f| f.is_fatal()) {
                builder.mark_aborted(failure.clone());
                let report = builder.finish();
                self.submit(&report);
                return Err(E2eError::Aborted {
                    scenario: scenario.name().to_string(),
                    failure,
                    report: Box::new(report),
                });
            }
            if !passed {
                break;
            }
        }

        let report = builder.finish();
        if report.success() {
            info!("✓ {} ({} ms)", report.scenario(), report.duration_ms());
        } else {
            info!("✗ {} ({} ms)", report.scenario(), report.duration_ms());
        }
        self.submit(&report);
        Ok(report)
    }

    fn submit(&self, report: &ScenarioReport) {
        for sink in &self.sinks {
            sink.submit(report);
        }
    }
}
