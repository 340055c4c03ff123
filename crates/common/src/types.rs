//! Timing specs and verification outcomes

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::{ActionFailure, Error, FailureKind, Result};

/// Default explicit-wait budget for dashboard elements
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default polling interval for explicit waits
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timeout budget and polling interval for a wait.
///
/// Invariant: `0 < poll_interval < timeout`, both whole milliseconds. Enforced
/// by [`WaitSpec::new`] and on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WaitSpecRepr", into = "WaitSpecRepr")]
pub struct WaitSpec {
    timeout: Duration,
    poll_interval: Duration,
}

impl WaitSpec {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Result<Self> {
        if poll_interval.is_zero() || timeout.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "wait timeout ({:?}) and poll interval ({:?}) must be positive",
                timeout, poll_interval
            )));
        }
        let whole_ms = |d: Duration| d.subsec_nanos() % 1_000_000 == 0;
        if !whole_ms(timeout) || !whole_ms(poll_interval) {
            return Err(Error::InvalidConfig(format!(
                "wait timeout ({:?}) and poll interval ({:?}) must be whole milliseconds",
                timeout, poll_interval
            )));
        }
        if poll_interval >= timeout {
            return Err(Error::InvalidConfig(format!(
                "poll interval {:?} must be shorter than timeout {:?}",
                poll_interval, timeout
            )));
        }
        Ok(Self {
            timeout,
            poll_interval,
        })
    }

    pub fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> Result<Self> {
        Self::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(poll_interval_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Upper bound on polls a wait with this spec performs: ⌈timeout / poll⌉ + 1
    pub fn max_polls(&self) -> u32 {
        let timeout = self.timeout.as_nanos();
        let poll = self.poll_interval.as_nanos();
        let intervals = (timeout + poll - 1) / poll;
        u32::try_from(intervals + 1).unwrap_or(u32::MAX)
    }
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WaitSpecRepr {
    timeout_ms: u64,
    poll_interval_ms: u64,
}

impl TryFrom<WaitSpecRepr> for WaitSpec {
    type Error = Error;

    fn try_from(repr: WaitSpecRepr) -> Result<Self> {
        WaitSpec::from_millis(repr.timeout_ms, repr.poll_interval_ms)
    }
}

impl From<WaitSpec> for WaitSpecRepr {
    fn from(spec: WaitSpec) -> Self {
        Self {
            timeout_ms: spec.timeout.as_millis() as u64,
            poll_interval_ms: spec.poll_interval.as_millis() as u64,
        }
    }
}

/// Attempt budget, inter-attempt delay and the failure kinds worth retrying
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RetrySpecRepr", into = "RetrySpecRepr")]
pub struct RetrySpec {
    max_attempts: u32,
    delay_between: Duration,
    retryable: BTreeSet<FailureKind>,
}

impl RetrySpec {
    pub fn new(
        max_attempts: u32,
        delay_between: Duration,
        retryable: impl IntoIterator<Item = FailureKind>,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        let retryable: BTreeSet<FailureKind> = retryable.into_iter().collect();
        if let Some(kind) = retryable.iter().find(|kind| kind.is_fatal()) {
            return Err(Error::InvalidConfig(format!(
                "{} is fatal and cannot be retried",
                kind
            )));
        }
        Ok(Self {
            max_attempts,
            delay_between,
            retryable,
        })
    }

    /// Retry only the transient kinds
    pub fn transient(max_attempts: u32, delay_between: Duration) -> Result<Self> {
        Self::new(max_attempts, delay_between, FailureKind::TRANSIENT)
    }

    /// A single attempt, nothing retried
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay_between: Duration::ZERO,
            retryable: BTreeSet::new(),
        }
    }

    /// Also retry `kind`. Fatal kinds are never retried and are ignored.
    pub fn with_retryable(mut self, kind: FailureKind) -> Self {
        if !kind.is_fatal() {
            self.retryable.insert(kind);
        }
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay_between(&self) -> Duration {
        self.delay_between
    }

    pub fn retryable(&self) -> &BTreeSet<FailureKind> {
        &self.retryable
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retryable.contains(&kind)
    }
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_between: Duration::from_millis(500),
            retryable: FailureKind::TRANSIENT.into_iter().collect(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RetrySpecRepr {
    max_attempts: u32,
    delay_ms: u64,
    #[serde(default = "default_retryable")]
    retryable: Vec<FailureKind>,
}

fn default_retryable() -> Vec<FailureKind> {
    FailureKind::TRANSIENT.to_vec()
}

impl TryFrom<RetrySpecRepr> for RetrySpec {
    type Error = Error;

    fn try_from(repr: RetrySpecRepr) -> Result<Self> {
        RetrySpec::new(
            repr.max_attempts,
            Duration::from_millis(repr.delay_ms),
            repr.retryable,
        )
    }
}

impl From<RetrySpec> for RetrySpecRepr {
    fn from(spec: RetrySpec) -> Self {
        Self {
            max_attempts: spec.max_attempts,
            delay_ms: spec.delay_between.as_millis() as u64,
            retryable: spec.retryable.into_iter().collect(),
        }
    }
}

/// Result of polling a condition under a [`WaitSpec`]
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome<T> {
    /// The condition held; `value` is what was observed when it did
    Matched { value: T, polls: u32 },
    /// The budget ran out. The last observation is kept for diagnostics.
    TimedOut {
        last_observed: Option<T>,
        last_failure: Option<ActionFailure>,
        polls: u32,
    },
}

impl<T> VerificationOutcome<T> {
    pub fn is_matched(&self) -> bool {
        matches!(self, VerificationOutcome::Matched { .. })
    }

    pub fn polls(&self) -> u32 {
        match self {
            VerificationOutcome::Matched { polls, .. } => *polls,
            VerificationOutcome::TimedOut { polls, .. } => *polls,
        }
    }

    /// The matched value, if any
    pub fn matched(self) -> Option<T> {
        match self {
            VerificationOutcome::Matched { value, .. } => Some(value),
            VerificationOutcome::TimedOut { .. } => None,
        }
    }

    pub fn last_observed(&self) -> Option<&T> {
        match self {
            VerificationOutcome::Matched { value, .. } => Some(value),
            VerificationOutcome::TimedOut { last_observed, .. } => last_observed.as_ref(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> VerificationOutcome<U> {
        match self {
            VerificationOutcome::Matched { value, polls } => VerificationOutcome::Matched {
                value: f(value),
                polls,
            },
            VerificationOutcome::TimedOut {
                last_observed,
                last_failure,
                polls,
            } => VerificationOutcome::TimedOut {
                last_observed: last_observed.map(f),
                last_failure,
                polls,
            },
        }
    }
}
