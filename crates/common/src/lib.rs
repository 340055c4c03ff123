//! EzyScribe Common Library
//!
//! Shared vocabulary for the regression suite: the failure taxonomy, wait and
//! retry specs, scenario reports and suite configuration.

pub mod config;
pub mod error;
pub mod report;
pub mod types;

// Re-export commonly used types
pub use config::{BrowserConfig, Credentials, Role, RolesConfig, SuiteConfig, TimingConfig};
pub use error::{ActionFailure, ActionResult, Error, FailureKind, Result, Severity};
pub use report::{
    JsonReportSink, ReportSink, ScenarioReport, ScenarioReportBuilder, StepOutcome, StepRecord,
    TracingReportSink,
};
pub use types::{RetrySpec, VerificationOutcome, WaitSpec};

/// Suite version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
