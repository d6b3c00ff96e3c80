use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use compat_matrix_core::prelude::MatrixResult;
use nanoid::nanoid;
use parking_lot::Mutex;

use crate::context::RunnerContext;
use crate::definition::{MatrixDefinitionBuilder, Scenario};
use crate::executor::Executor;
use crate::lifecycle::{run_scenario, ScenarioHooks};
use crate::progress::scenario_progress;
use crate::report::{print_matrix, MatrixReport, ScenarioOutcome};
use crate::shutdown::start_shutdown_listener;

/// Run every selected scenario of the matrix and report the outcomes.
///
/// Returns the number of scenarios that did not pass. An `Err` means the matrix itself could not
/// run, for example because the definition is invalid.
pub fn run(definition: MatrixDefinitionBuilder) -> MatrixResult<usize> {
    let definition = definition.build()?;

    if definition.list {
        print_matrix(
            &definition.name,
            &definition.scenarios,
            &definition.identifiers,
        );
        return Ok(0);
    }

    let total = definition.scenarios.len();
    log::info!("Running matrix: {} ({total} scenarios)", definition.name);

    let run_id = definition.run_id.clone().unwrap_or_else(|| nanoid!());
    let started_at = chrono::Utc::now().timestamp();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let runner_context = Arc::new(RunnerContext::new(
        executor,
        shutdown_handle.clone(),
        definition.settings.clone(),
        definition.identifiers.clone(),
    ));

    let hooks = Arc::new(ScenarioHooks::from(&definition));
    let queue = Arc::new(Mutex::new(
        definition
            .scenarios
            .iter()
            .cloned()
            .enumerate()
            .collect::<VecDeque<_>>(),
    ));
    let outcomes = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let progress = scenario_progress(total, definition.no_progress);

    let mut handles = Vec::new();
    for worker_index in 0..definition.parallelism.min(total) {
        let queue = queue.clone();
        let outcomes = outcomes.clone();
        let hooks = hooks.clone();
        let runner_context = runner_context.clone();
        let progress = progress.clone();
        // Checked between scenarios, a running scenario is left to finish.
        let shutdown_listener = shutdown_handle.new_listener();

        handles.push(
            std::thread::Builder::new()
                .name(format!("scenario-worker-{worker_index}"))
                .spawn(move || loop {
                    if shutdown_listener.should_shutdown() {
                        log::debug!("Stopping scenario worker {worker_index}");
                        break;
                    }

                    let Some((index, scenario)) = queue.lock().pop_front() else {
                        break;
                    };

                    progress.set_message(scenario.to_string());
                    let outcome = run_scenario_guarded(scenario, &hooks, runner_context.clone());
                    progress.inc(1);

                    outcomes.lock().push((index, outcome));
                })
                .context("Failed to spawn thread for scenario worker")?,
        );
    }

    for handle in handles {
        handle
            .join()
            .map_err(|e| anyhow::anyhow!("Error joining thread for scenario worker: {:?}", e))?;
    }
    progress.finish_and_clear();

    let mut outcomes = std::mem::take(&mut *outcomes.lock());
    let skipped = queue.lock().drain(..).collect::<Vec<_>>();
    if !skipped.is_empty() {
        log::warn!("Matrix stopped with {} scenarios not run", skipped.len());
    }
    outcomes.extend(
        skipped
            .into_iter()
            .map(|(index, scenario)| (index, ScenarioOutcome::skipped(scenario))),
    );
    outcomes.sort_by_key(|(index, _)| *index);

    let report = MatrixReport {
        run_id,
        matrix_name: definition.name.clone(),
        started_at,
        finished_at: chrono::Utc::now().timestamp(),
        outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    };

    report.print_table();
    if let Some(summary_file) = &definition.summary_file {
        report.write_json(summary_file)?;
        log::info!("Wrote run summary to '{}'", summary_file.display());
    }

    Ok(report.failed_count())
}

/// A panicking hook fails its scenario rather than the worker, so the rest of the matrix still runs.
fn run_scenario_guarded(
    scenario: Scenario,
    hooks: &ScenarioHooks,
    runner_context: Arc<RunnerContext>,
) -> ScenarioOutcome {
    let for_report = scenario.clone();
    match std::panic::catch_unwind(AssertUnwindSafe(|| {
        run_scenario(scenario, hooks, runner_context)
    })) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("[{for_report}] panicked: {message}");
            ScenarioOutcome::panicked(for_report, message)
        }
    }
}
