//! Scenario reports and the sinks they are handed to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ActionFailure, FailureKind, Result};

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        observed: Option<String>,
    },
    Failed {
        kind: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
    /// The action ran but its effect never showed up within the wait budget
    VerificationTimedOut {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_observed: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_failure: Option<String>,
    },
}

impl StepOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, StepOutcome::Passed { .. })
    }

    pub fn failed(failure: &ActionFailure) -> Self {
        StepOutcome::Failed {
            kind: failure.kind,
            message: failure.message.clone(),
            cause: failure.cause.clone(),
        }
    }

    /// Failure kind for reporting; verification timeouts count as `Timeout`
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            StepOutcome::Passed { .. } => None,
            StepOutcome::Failed { kind, .. } => Some(*kind),
            StepOutcome::VerificationTimedOut { .. } => Some(FailureKind::Timeout),
        }
    }
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    /// Action attempts, including retries
    pub attempts: u32,
    /// Verification reads, when the step verifies its effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_polls: Option<u32>,
    pub duration_ms: u64,
}

/// Finalized record of one scenario execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    id: Uuid,
    scenario: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration_ms: u64,
    cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aborted: Option<ActionFailure>,
    steps: Vec<StepRecord>,
}

impl ScenarioReport {
    /// Start collecting a report for `scenario`
    pub fn builder(scenario: impl Into<String>) -> ScenarioReportBuilder {
        ScenarioReportBuilder {
            id: Uuid::new_v4(),
            scenario: scenario.into(),
            role: None,
            started_at: Utc::now(),
            cancelled: false,
            aborted: None,
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn aborted(&self) -> Option<&ActionFailure> {
        self.aborted.as_ref()
    }

    /// Passed iff every attempted step passed and the run was neither cancelled nor aborted
    pub fn success(&self) -> bool {
        !self.cancelled
            && self.aborted.is_none()
            && self.steps.iter().all(|s| s.outcome.is_passed())
    }

    /// First failing step, if any
    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| !s.outcome.is_passed())
    }

    /// Steps with the timing fields zeroed, for comparing two runs
    pub fn untimed_steps(&self) -> Vec<StepRecord> {
        self.steps
            .iter()
            .cloned()
            .map(|mut s| {
                s.duration_ms = 0;
                s
            })
            .collect()
    }
}

/// Mutable report under construction; [`finish`](Self::finish) freezes it
#[derive(Debug)]
pub struct ScenarioReportBuilder {
    id: Uuid,
    scenario: String,
    role: Option<String>,
    started_at: DateTime<Utc>,
    cancelled: bool,
    aborted: Option<ActionFailure>,
    steps: Vec<StepRecord>,
}

impl ScenarioReportBuilder {
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn push(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn mark_aborted(&mut self, failure: ActionFailure) {
        self.aborted = Some(failure);
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn finish(self) -> ScenarioReport {
        let finished_at = Utc::now();
        let duration_ms = (finished_at - self.started_at).num_milliseconds().max(0) as u64;
        ScenarioReport {
            id: self.id,
            scenario: self.scenario,
            role: self.role,
            started_at: self.started_at,
            finished_at,
            duration_ms,
            cancelled: self.cancelled,
            aborted: self.aborted,
            steps: self.steps,
        }
    }
}

/// Destination for finalized reports. Submission is fire-and-forget:
/// sinks log their own errors and never fail the scenario.
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    fn submit(&self, report: &ScenarioReport);
}

/// Writes one pretty-printed JSON file per scenario
pub struct JsonReportSink {
    dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the report for `report` is written to. Always a direct child of
    /// the sink directory.
    pub fn path_for(&self, report: &ScenarioReport) -> PathBuf {
        let short_id = report.id.simple().to_string();
        let stem: String = report
            .scenario
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}-{}.json", stem, &short_id[..8]))
    }

    pub fn write(&self, report: &ScenarioReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(report);
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    fn submit(&self, report: &ScenarioReport) {
        match self.write(report) {
            Ok(path) => {
                info!(scenario = %report.scenario, path = %path.display(), "Report written")
            }
            Err(e) => warn!(scenario = %report.scenario, error = %e, "Failed to write report"),
        }
    }
}

/// Logs a per-step summary through `tracing`
#[derive(Debug, Default)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn submit(&self, report: &ScenarioReport) {
        for step in &report.steps {
            match &step.outcome {
                StepOutcome::Passed { .. } => info!(
                    scenario = %report.scenario,
                    step = %step.name,
                    attempts = step.attempts,
                    duration_ms = step.duration_ms,
                    "step passed"
                ),
                StepOutcome::Failed { kind, message, .. } => error!(
                    scenario = %report.scenario,
                    step = %step.name,
                    attempts = step.attempts,
                    %kind,
                    "step failed: {}", message
                ),
                StepOutcome::VerificationTimedOut { last_observed, .. } => error!(
                    scenario = %report.scenario,
                    step = %step.name,
                    polls = step.verification_polls.unwrap_or(0),
                    last_observed = last_observed.as_deref().unwrap_or("<none>"),
                    "step verification timed out"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed(name: &str) -> StepRecord {
        StepRecord {
            name: name.to_string(),
            outcome: StepOutcome::Passed { observed: None },
            attempts: 1,
            verification_polls: None,
            duration_ms: 12,
        }
    }

    #[test]
    fn test_report_success() {
        let mut builder = ScenarioReport::builder("theme-switch").role("scribe");
        builder.push(passed("open theme menu"));
        builder.push(passed("select dark"));
        let report = builder.finish();

        assert!(report.success());
        assert_eq!(report.steps().len(), 2);
        assert_eq!(report.role(), Some("scribe"));
        assert!(report.first_failure().is_none());
    }

    #[test]
    fn test_report_failure_and_cancel() {
        let mut builder = ScenarioReport::builder("ascending-sort");
        builder.push(passed("open sort menu"));
        builder.push(StepRecord {
            name: "confirm ascending order".to_string(),
            outcome: StepOutcome::VerificationTimedOut {
                last_observed: Some("[3, 1, 2]".to_string()),
                last_failure: None,
            },
            attempts: 1,
            verification_polls: Some(21),
            duration_ms: 2000,
        });
        let report = builder.finish();
        assert!(!report.success());
        assert_eq!(report.first_failure().unwrap().name, "confirm ascending order");
        assert_eq!(
            report.first_failure().unwrap().outcome.failure_kind(),
            Some(FailureKind::Timeout)
        );

        let mut builder = ScenarioReport::builder("cancelled");
        builder.mark_cancelled();
        assert!(!builder.finish().success());
    }

    #[test]
    fn test_untimed_steps_ignore_duration() {
        let mut a = ScenarioReport::builder("reads");
        a.push(passed("read rows"));
        let mut b = ScenarioReport::builder("reads");
        let mut slower = passed("read rows");
        slower.duration_ms = 900;
        b.push(slower);

        assert_eq!(a.finish().untimed_steps(), b.finish().untimed_steps());
    }

    #[test]
    fn test_json_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path());

        let mut builder = ScenarioReport::builder("status-filter");
        builder.push(passed("apply status filter"));
        let report = builder.finish();

        let path = sink.write(&report).unwrap();
        assert!(path.starts_with(dir.path()));

        let content = std::fs::read_to_string(&path).unwrap();
        let back: ScenarioReport = serde_json::from_str(&content).unwrap();
        assert_eq!(back.scenario(), "status-filter");
        assert_eq!(back.id(), report.id());
        assert!(content.contains("\"status\": \"passed\""));
    }

    #[test]
    fn test_json_sink_keeps_reports_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path());

        let report = ScenarioReport::builder("../evil/name").finish();
        let path = sink.path_for(&report);
        assert_eq!(path.parent(), Some(dir.path()));

        let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file_name.starts_with("___evil_name-"));

        let written = sink.write(&report).unwrap();
        assert_eq!(written, path);
        assert!(written.exists());
    }
}
