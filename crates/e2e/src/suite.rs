//! Suite runner: runs a selection of scenarios on one browser session

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ezyscribe_common::{
    JsonReportSink, Role, ScenarioReport, SuiteConfig, TracingReportSink,
};

use crate::error::{E2eError, E2eResult};
use crate::flows::{self, FlowContext, ScenarioInfo};
use crate::gateway::UiGateway;
use crate::runner::{Scenario, ScenarioRunner};
use crate::webdriver::WebDriverClient;

/// File the suite summary is written to
pub const RESULTS_FILE: &str = "test-results.json";

/// Which catalogue entries to run
#[derive(Debug, Clone, Default)]
pub struct ScenarioFilter {
    /// Exact scenario names; empty means all
    pub names: Vec<String>,
    /// Any of these tags; empty means all
    pub tags: Vec<String>,
}

impl ScenarioFilter {
    pub fn matches(&self, info: &ScenarioInfo) -> bool {
        let name_ok = self.names.is_empty() || self.names.iter().any(|n| n == info.name);
        let tag_ok = self.tags.is_empty() || self.tags.iter().any(|t| info.has_tag(t));
        name_ok && tag_ok
    }

    /// Catalogue entries selected for `role`, in run order
    pub fn select(&self, role: Role) -> E2eResult<Vec<&'static ScenarioInfo>> {
        for name in &self.names {
            if !flows::catalogue_for(role).iter().any(|info| info.name == name) {
                return Err(E2eError::ScenarioNotFound(format!("{} (role {})", name, role)));
            }
        }
        Ok(flows::catalogue_for(role)
            .into_iter()
            .filter(|info| self.matches(info))
            .collect())
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Scenarios cancelled mid-run or never started
    pub cancelled: usize,
    pub duration_ms: u64,
    /// Fatal failure that stopped the suite
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub reports: Vec<ScenarioReport>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.aborted.is_none()
    }
}

/// Runs scenarios one after another
pub struct SuiteRunner {
    runner: ScenarioRunner,
    output_dir: PathBuf,
}

impl SuiteRunner {
    pub fn new(runner: ScenarioRunner, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run scenarios in order. A fatal abort or cancellation stops the suite;
    /// scenarios not started are counted as cancelled.
    pub async fn run(&self, scenarios: &[Scenario]) -> SuiteResult {
        let start = Instant::now();
        let mut reports = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let mut cancelled = 0;
        let mut aborted = None;
        let cancel = self.runner.cancellation_token();

        info!("Running {} scenario(s)...", scenarios.len());

        for (index, scenario) in scenarios.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled += scenarios.len() - index;
                warn!(remaining = scenarios.len() - index, "Suite cancelled");
                break;
            }

            match self.runner.run(scenario).await {
                Ok(report) => {
                    if report.success() {
                        passed += 1;
                    } else if report.is_cancelled() {
                        cancelled += 1;
                    } else {
                        failed += 1;
                        if let Some(step) = report.first_failure() {
                            error!("✗ {} - {}: {:?}", report.scenario(), step.name, step.outcome);
                        }
                    }
                    reports.push(report);
                }
                Err(E2eError::Aborted { failure, report, .. }) => {
                    failed += 1;
                    error!("✗ {} - aborted: {}", scenario.name(), failure);
                    reports.push(*report);
                    cancelled += scenarios.len() - index - 1;
                    aborted = Some(failure.to_string());
                    break;
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", scenario.name(), e);
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Suite results: {} passed, {} failed, {} cancelled ({} ms)",
            passed, failed, cancelled, duration_ms
        );

        SuiteResult {
            total: scenarios.len(),
            passed,
            failed,
            cancelled,
            duration_ms,
            aborted,
            reports,
        }
    }

    /// Build the selected scenarios for the context's role and run them
    pub async fn run_selection(
        &self,
        ctx: &FlowContext,
        filter: &ScenarioFilter,
    ) -> E2eResult<SuiteResult> {
        let scenarios = filter
            .select(ctx.role)?
            .into_iter()
            .map(|info| flows::build(info.name, ctx))
            .collect::<E2eResult<Vec<_>>>()?;
        Ok(self.run(&scenarios).await)
    }

    /// Write the suite summary as JSON
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join(RESULTS_FILE);
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Open a browser session, run the selection for `role`, close the session
/// and write the results
pub async fn run_suite(
    config: &SuiteConfig,
    role: Role,
    filter: &ScenarioFilter,
    cancel: CancellationToken,
) -> E2eResult<SuiteResult> {
    config.validate()?;
    if filter.select(role)?.iter().any(|info| info.needs_credentials) {
        config.require_credentials(role)?;
    }

    let driver = WebDriverClient::connect(config).await?;
    let gateway = Arc::new(UiGateway::new(Box::new(driver), config.base_url.clone()));
    let ctx = FlowContext::new(gateway.clone(), config, role);

    let runner = ScenarioRunner::new()
        .with_sink(Arc::new(TracingReportSink))
        .with_sink(Arc::new(JsonReportSink::new(&config.output_dir)))
        .with_cancellation(cancel);
    let suite = SuiteRunner::new(runner, &config.output_dir);

    let result = suite.run_selection(&ctx, filter).await;

    if let Err(failure) = gateway.quit().await {
        warn!(error = %failure, "Failed to close browser session");
    }

    let result = result?;
    suite.write_results(&result)?;
    Ok(result)
}
