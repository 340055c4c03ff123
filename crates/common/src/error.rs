//! Error types for the EzyScribe suite
//!
//! Two layers live here:
//! - [`FailureKind`] / [`ActionFailure`]: the driver-independent classification of a
//!   single UI action failure. Retry and wait policy decide on the kind alone.
//! - [`Error`]: infrastructure errors (I/O, config parsing) raised outside a scenario.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using the suite Error
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of one UI action: the value, or a classified failure
pub type ActionResult<T> = std::result::Result<T, ActionFailure>;

/// Suite infrastructure errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<Error> for ActionFailure {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidConfig(msg) => ActionFailure::new(FailureKind::InvalidConfig, msg),
            other => ActionFailure::new(FailureKind::Unknown, other.to_string()),
        }
    }
}

/// How a failure is handled by the orchestration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Expected to clear on its own; retried
    Transient,
    /// Recorded as a step failure; the scenario stops but still reports
    Structural,
    /// Aborts the scenario immediately
    Fatal,
}

/// Driver-independent failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Element handle detached from the DOM by a re-render
    StaleReference,
    /// Content not in place yet (empty table, missing cells)
    NotYetRendered,
    /// Element present but covered, disabled or mid-animation
    NotInteractable,
    /// No element matched the locator
    NotFound,
    /// Driver-side or verification timeout
    Timeout,
    /// Observed state differs from the expected state
    Mismatch,
    /// Malformed locator, script or argument
    InvalidInput,
    /// Browser session is gone
    SessionLost,
    /// Suite configuration cannot be used
    InvalidConfig,
    Unknown,
}

impl FailureKind {
    /// Kinds retried by default
    pub const TRANSIENT: [FailureKind; 3] = [
        FailureKind::StaleReference,
        FailureKind::NotYetRendered,
        FailureKind::NotInteractable,
    ];

    pub fn severity(self) -> Severity {
        match self {
            FailureKind::StaleReference
            | FailureKind::NotYetRendered
            | FailureKind::NotInteractable => Severity::Transient,
            FailureKind::NotFound
            | FailureKind::Timeout
            | FailureKind::Mismatch
            | FailureKind::InvalidInput
            | FailureKind::Unknown => Severity::Structural,
            FailureKind::SessionLost | FailureKind::InvalidConfig => Severity::Fatal,
        }
    }

    pub fn is_transient(self) -> bool {
        self.severity() == Severity::Transient
    }

    pub fn is_fatal(self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Whether a polling wait should read this failure as "not yet".
    ///
    /// Missing elements and driver-side timeouts are normal while a view is
    /// still rendering, so they count as pending on top of the transient kinds.
    pub fn is_pending(self) -> bool {
        self.is_transient() || matches!(self, FailureKind::NotFound | FailureKind::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::StaleReference => "stale_reference",
            FailureKind::NotYetRendered => "not_yet_rendered",
            FailureKind::NotInteractable => "not_interactable",
            FailureKind::NotFound => "not_found",
            FailureKind::Timeout => "timeout",
            FailureKind::Mismatch => "mismatch",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::SessionLost => "session_lost",
            FailureKind::InvalidConfig => "invalid_config",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified UI action failure
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ActionFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Underlying driver message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Attempts made before this failure was surfaced
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl ActionFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            attempts: 1,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::new(FailureKind::StaleReference, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn not_yet_rendered(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotYetRendered, message)
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Mismatch, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}
