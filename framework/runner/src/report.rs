use std::fmt::{Display, Formatter};
use std::path::Path;

use anyhow::Context;
use compat_matrix_core::prelude::{HarnessError, MatrixResult, ShutdownSignalError};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::definition::Scenario;
use crate::identifiers::BuildIdentifierTable;
use crate::lifecycle::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Passed,
    Failed,
    /// Stopped part way by a shutdown signal.
    Cancelled,
    /// Never started because the matrix was stopped first.
    Skipped,
}

impl Display for ScenarioStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ScenarioStatus::Passed => "passed",
            ScenarioStatus::Failed => "FAILED",
            ScenarioStatus::Cancelled => "cancelled",
            ScenarioStatus::Skipped => "skipped",
        };
        f.write_str(status)
    }
}

/// Why something failed, classified by the kind of [HarnessError] behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: String,
    pub message: String,
}

impl FailureDetail {
    pub fn from_error(error: &anyhow::Error) -> Self {
        let kind = if let Some(harness_error) = error.downcast_ref::<HarnessError>() {
            harness_error.kind()
        } else if error.is::<ShutdownSignalError>() {
            "Cancelled"
        } else {
            "Error"
        };

        Self {
            kind: kind.to_string(),
            message: format!("{error:#}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    #[serde(flatten)]
    pub scenario: Scenario,
    pub status: ScenarioStatus,
    /// The phase the scenario stopped in, if it did not pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<Phase>,
    /// The first failure, later check failures are only in `checks`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetail>,
    pub checks: Vec<CheckOutcome>,
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    pub(crate) fn skipped(scenario: Scenario) -> Self {
        Self {
            scenario,
            status: ScenarioStatus::Skipped,
            failed_phase: None,
            failure: None,
            checks: Vec::new(),
            duration_ms: 0,
        }
    }

    pub(crate) fn panicked(scenario: Scenario, message: String) -> Self {
        Self {
            scenario,
            status: ScenarioStatus::Failed,
            failed_phase: None,
            failure: Some(FailureDetail {
                kind: "Panic".to_string(),
                message,
            }),
            checks: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ScenarioStatus::Passed
    }
}

/// Everything recorded about one run of the matrix.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub run_id: String,
    pub matrix_name: String,
    /// Unix timestamp, in seconds.
    pub started_at: i64,
    pub finished_at: i64,
    pub outcomes: Vec<ScenarioOutcome>,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Image")]
    runtime_image: String,
    #[tabled(rename = "Variant")]
    agent_variant: String,
    #[tabled(rename = "Status")]
    status: ScenarioStatus,
    #[tabled(rename = "Checks")]
    checks: String,
    #[tabled(rename = "Time (s)", display = "seconds")]
    duration_ms: u64,
    #[tabled(rename = "Failure")]
    failure: String,
}

#[derive(Tabled)]
struct ScenarioRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Image")]
    runtime_image: String,
    #[tabled(rename = "Variant")]
    agent_variant: String,
    #[tabled(rename = "Expected build identifier")]
    identifier: String,
}

/// Print the scenarios selected to run, without running them.
pub(crate) fn print_matrix(
    matrix_name: &str,
    scenarios: &[Scenario],
    identifiers: &BuildIdentifierTable,
) {
    let rows = scenarios
        .iter()
        .enumerate()
        .map(|(index, scenario)| ScenarioRow {
            index: index + 1,
            runtime_image: scenario.runtime_image.clone(),
            agent_variant: scenario.agent_variant.clone(),
            identifier: identifiers.identifier_for(&scenario.agent_variant),
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(&rows);
    table.with(Style::modern());

    println!("Scenarios in {matrix_name}");
    println!("{}", table);
}

fn seconds(duration_ms: &u64) -> String {
    format!("{:.1}", *duration_ms as f64 / 1000.0)
}

impl MatrixReport {
    /// How many scenarios did not pass, skipped and cancelled ones included.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.passed()).count()
    }

    pub fn print_table(&self) {
        let rows = self
            .outcomes
            .iter()
            .map(|outcome| OutcomeRow {
                runtime_image: outcome.scenario.runtime_image.clone(),
                agent_variant: outcome.scenario.agent_variant.clone(),
                status: outcome.status,
                checks: format!(
                    "{}/{}",
                    outcome.checks.iter().filter(|c| c.passed).count(),
                    outcome.checks.len()
                ),
                duration_ms: outcome.duration_ms,
                failure: outcome
                    .failure
                    .as_ref()
                    .map(|f| format!("{}: {}", f.kind, f.message))
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        let mut table = Table::new(&rows);
        table.with(Style::modern());

        println!("\nResults for {} (run {})", self.matrix_name, self.run_id);
        println!("{}", table);
        println!(
            "{} of {} scenarios passed",
            self.outcomes.len() - self.failed_count(),
            self.outcomes.len()
        );
    }

    pub fn write_json(&self, path: &Path) -> MatrixResult<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create summary file '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write run summary")?;

        Ok(())
    }
}
