//! Run Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use ezyscribe_common::{Role, ScenarioReport, StepOutcome, SuiteConfig};
use ezyscribe_e2e::{run_suite, ScenarioFilter, SuiteResult};

use crate::output::{
    print_error, print_item, print_list, print_success, status_cell, OutputFormat, TableDisplay,
};

#[derive(Args)]
pub struct RunArgs {
    /// Role to sign in as (doctor or scribe)
    #[arg(short, long, default_value = "scribe")]
    pub role: Role,

    /// Only run scenarios with this tag (repeatable)
    #[arg(short, long)]
    pub tag: Vec<String>,

    /// Only run the named scenario (repeatable)
    #[arg(short = 's', long = "scenario")]
    pub scenarios: Vec<String>,

    /// Directory for JSON reports (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// One scenario line of the summary
#[derive(Serialize)]
pub struct ScenarioRow {
    pub scenario: String,
    pub role: String,
    pub passed: bool,
    pub steps: usize,
    pub attempts: u32,
    pub duration_ms: u64,
    pub failed_step: Option<String>,
}

impl From<&ScenarioReport> for ScenarioRow {
    fn from(report: &ScenarioReport) -> Self {
        let failed_step = report.first_failure().map(|step| match &step.outcome {
            StepOutcome::VerificationTimedOut { .. } => {
                format!("{} (verification timed out)", step.name)
            }
            _ => step.name.clone(),
        });
        let failed_step = failed_step.or_else(|| {
            report
                .is_cancelled()
                .then(|| "cancelled".to_string())
        });

        Self {
            scenario: report.scenario().to_string(),
            role: report.role().unwrap_or("-").to_string(),
            passed: report.success(),
            steps: report.steps().len(),
            attempts: report.steps().iter().map(|s| s.attempts).sum(),
            duration_ms: report.duration_ms(),
            failed_step,
        }
    }
}

impl TableDisplay for ScenarioRow {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Role", "Status", "Steps", "Attempts", "Duration", "Failed Step"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.scenario.clone(),
            self.role.clone(),
            status_cell(self.passed),
            self.steps.to_string(),
            self.attempts.to_string(),
            format!("{} ms", self.duration_ms),
            self.failed_step.clone().unwrap_or_default(),
        ]
    }
}

/// Suite totals
#[derive(Serialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub duration_ms: u64,
    pub aborted: Option<String>,
}

impl From<&SuiteResult> for SuiteSummary {
    fn from(result: &SuiteResult) -> Self {
        Self {
            total: result.total,
            passed: result.passed,
            failed: result.failed,
            cancelled: result.cancelled,
            duration_ms: result.duration_ms,
            aborted: result.aborted.clone(),
        }
    }
}

impl TableDisplay for SuiteSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Total", "Passed", "Failed", "Cancelled", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.total.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.cancelled.to_string(),
            format!("{:.1}s", self.duration_ms as f64 / 1000.0),
        ]
    }
}

/// Cancel `token` on Ctrl-C; the running step finishes first
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            token.cancel();
        }
    });
}

/// Run the selected scenarios. Returns whether the suite passed.
pub async fn execute(args: RunArgs, mut config: SuiteConfig, format: OutputFormat) -> Result<bool> {
    if let Some(dir) = args.output {
        config.output_dir = dir;
    }

    let filter = ScenarioFilter {
        names: args.scenarios,
        tags: args.tag,
    };

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let result = run_suite(&config, args.role, &filter, cancel).await?;

    let rows: Vec<ScenarioRow> = result.reports.iter().map(ScenarioRow::from).collect();
    print_list(&rows, format);
    print_item(&SuiteSummary::from(&result), format);

    if result.success() {
        print_success(&format!("{} scenario(s) passed", result.passed));
    } else if let Some(reason) = &result.aborted {
        print_error(&format!("Suite aborted: {}", reason));
    } else {
        print_error(&format!(
            "{} failed, {} cancelled of {}",
            result.failed, result.cancelled, result.total
        ));
    }

    Ok(result.success())
}
