use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use compat_matrix_core::prelude::ShutdownSignalError;
use serde::Serialize;

use crate::context::{RunnerContext, ScenarioContext};
use crate::definition::{MatrixDefinition, Scenario, ScenarioHook};
use crate::report::{CheckOutcome, FailureDetail, ScenarioOutcome, ScenarioStatus};

/// The steps every scenario goes through, in order. Tearing down always happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Staging,
    Launching,
    Checking,
    TearingDown,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            Phase::Staging => "staging",
            Phase::Launching => "launching",
            Phase::Checking => "checking",
            Phase::TearingDown => "tearing down",
        };
        f.write_str(phase)
    }
}

/// The hooks of a matrix, which are the same for every scenario.
#[derive(Clone)]
pub(crate) struct ScenarioHooks {
    pub stage_fn: ScenarioHook,
    pub launch_fn: ScenarioHook,
    pub checks: Vec<(String, ScenarioHook)>,
}

impl From<&MatrixDefinition> for ScenarioHooks {
    fn from(definition: &MatrixDefinition) -> Self {
        Self {
            stage_fn: definition.stage_fn,
            launch_fn: definition.launch_fn,
            checks: definition.checks.clone(),
        }
    }
}

/// Run one scenario from staging to teardown.
///
/// Never fails itself, every failure is recorded in the outcome. Resources are released before
/// this returns, whichever phase the scenario stopped in.
pub(crate) fn run_scenario(
    scenario: Scenario,
    hooks: &ScenarioHooks,
    runner_context: Arc<RunnerContext>,
) -> ScenarioOutcome {
    let started = Instant::now();
    let mut ctx = ScenarioContext::new(scenario.clone(), runner_context);
    let mut outcome = ScenarioOutcome {
        scenario,
        status: ScenarioStatus::Passed,
        failed_phase: None,
        failure: None,
        checks: Vec::new(),
        duration_ms: 0,
    };

    log::info!("[{}] {}", outcome.scenario, Phase::Staging);
    let stopped = match (hooks.stage_fn)(&mut ctx) {
        Err(e) => Some((Phase::Staging, e)),
        Ok(()) => {
            log::info!("[{}] {}", outcome.scenario, Phase::Launching);
            (hooks.launch_fn)(&mut ctx)
                .err()
                .map(|e| (Phase::Launching, e))
        }
    };

    match stopped {
        Some((phase, e)) => {
            log::warn!("[{}] failed while {phase}: {e:#}", outcome.scenario);
            outcome.status = if e.is::<ShutdownSignalError>() {
                ScenarioStatus::Cancelled
            } else {
                ScenarioStatus::Failed
            };
            outcome.failed_phase = Some(phase);
            outcome.failure = Some(FailureDetail::from_error(&e));
        }
        None => {
            log::info!("[{}] {}", outcome.scenario, Phase::Checking);
            for (name, check) in &hooks.checks {
                let failure = match check(&mut ctx).with_context(|| format!("Check '{name}'")) {
                    Ok(()) => {
                        log::info!("[{}] check '{name}' passed", outcome.scenario);
                        None
                    }
                    Err(e) => {
                        log::warn!("[{}] {e:#}", outcome.scenario);
                        Some(FailureDetail::from_error(&e))
                    }
                };

                if failure.is_some() && outcome.failure.is_none() {
                    outcome.status = ScenarioStatus::Failed;
                    outcome.failed_phase = Some(Phase::Checking);
                    outcome.failure = failure.clone();
                }
                outcome.checks.push(CheckOutcome {
                    name: name.clone(),
                    passed: failure.is_none(),
                    failure,
                });
            }
        }
    }

    log::info!("[{}] {}", outcome.scenario, Phase::TearingDown);
    ctx.release();

    outcome.duration_ms = started.elapsed().as_millis() as u64;
    log::info!(
        "[{}] {} in {}ms",
        outcome.scenario,
        outcome.status,
        outcome.duration_ms
    );

    outcome
}
