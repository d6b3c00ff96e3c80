use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use compat_matrix_core::prelude::{HarnessError, MatrixResult, ShutdownHandle};
use compat_matrix_environment::{ContainerRuntime, Environment, LaunchSpec};
use compat_matrix_scraper::{ScrapeResult, Scraper};
use compat_matrix_volume::{ArtifactLayout, Volume};
use parking_lot::Mutex;

use crate::definition::Scenario;
use crate::executor::Executor;
use crate::identifiers::BuildIdentifierTable;

/// Settings shared by every scenario in a run.
#[derive(Debug, Clone)]
pub struct MatrixSettings {
    pub layout: ArtifactLayout,
    pub startup_timeout: Duration,
    pub pull_timeout: Duration,
    pub scrape_timeout: Duration,
    /// Overrides the host reported by the container runtime.
    pub scrape_host: Option<String>,
}

#[derive(Debug)]
pub struct RunnerContext {
    executor: Arc<Executor>,
    shutdown_handle: ShutdownHandle,
    settings: MatrixSettings,
    identifiers: BuildIdentifierTable,
    /// Resolved on first use so that runs which never launch do not need `docker` installed.
    container_runtime: Mutex<Option<ContainerRuntime>>,
}

impl RunnerContext {
    pub(crate) fn new(
        executor: Arc<Executor>,
        shutdown_handle: ShutdownHandle,
        settings: MatrixSettings,
        identifiers: BuildIdentifierTable,
    ) -> Self {
        Self {
            executor,
            shutdown_handle,
            settings,
            identifiers,
            container_runtime: Mutex::new(None),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn settings(&self) -> &MatrixSettings {
        &self.settings
    }

    pub fn identifiers(&self) -> &BuildIdentifierTable {
        &self.identifiers
    }

    pub fn container_runtime(&self) -> MatrixResult<ContainerRuntime> {
        let mut container_runtime = self.container_runtime.lock();
        if let Some(runtime) = container_runtime.as_ref() {
            return Ok(runtime.clone());
        }

        let runtime = ContainerRuntime::from_env()?;
        log::info!("Using container runtime at '{}'", runtime.bin_path().display());
        *container_runtime = Some(runtime.clone());

        Ok(runtime)
    }

    /// Stop dispatching scenarios. Scenarios that are already running finish, unless they are
    /// waiting on a launch, which is cancelled.
    pub fn force_stop_matrix(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown_handle.is_shutdown()
    }
}

/// What a scenario has acquired. Released in reverse order of acquisition, the environment first
/// and then the volume it is bound to.
#[derive(Debug, Default)]
pub(crate) struct ScenarioResources {
    environment: Option<Environment>,
    volume: Option<Volume>,
}

impl ScenarioResources {
    /// Release everything, logging rather than returning failures so that they cannot replace
    /// the outcome of the scenario.
    pub(crate) fn release(&mut self) {
        if let Some(mut environment) = self.environment.take() {
            if let Err(e) = environment.stop() {
                log::error!(
                    "Failed to stop environment '{}': {e:?}",
                    environment.container_name()
                );
            }
        }

        if let Some(mut volume) = self.volume.take() {
            if let Err(e) = volume.close() {
                log::error!("Failed to close volume: {e:?}");
            }
        }
    }
}

impl Drop for ScenarioResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// The context handed to each hook of one scenario.
///
/// Resources acquired through this context belong to the scenario and are released by the
/// runner once the scenario is over, whatever the outcome.
pub struct ScenarioContext {
    scenario: Scenario,
    runner_context: Arc<RunnerContext>,
    resources: ScenarioResources,
    scraper: Option<Scraper>,
}

impl ScenarioContext {
    pub(crate) fn new(scenario: Scenario, runner_context: Arc<RunnerContext>) -> Self {
        Self {
            scenario,
            runner_context,
            resources: ScenarioResources::default(),
            scraper: None,
        }
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext> {
        &self.runner_context
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.runner_context.settings().layout
    }

    /// Create the scenario's volume. A scenario has exactly one volume.
    pub fn stage_volume(&mut self, prefix: &str) -> MatrixResult<&mut Volume> {
        if self.resources.volume.is_some() {
            return Err(HarnessError::staging("A volume has already been staged").into());
        }

        let volume = self.resources.volume.insert(Volume::create(prefix)?);
        log::debug!(
            "Staging {} into '{}'",
            self.scenario,
            volume.host_path().display()
        );

        Ok(volume)
    }

    pub fn volume(&self) -> MatrixResult<&Volume> {
        self.resources
            .volume
            .as_ref()
            .ok_or_else(|| HarnessError::staging("No volume has been staged").into())
    }

    /// A launch spec for this scenario's runtime image with the run's timeouts applied.
    pub fn launch_spec(
        &self,
        command: &str,
        exposed_port: u16,
        readiness_pattern: &str,
    ) -> MatrixResult<LaunchSpec> {
        let settings = self.runner_context.settings();
        Ok(LaunchSpec::new(
            self.scenario.runtime_image.clone(),
            command,
            exposed_port,
            readiness_pattern,
        )?
        .with_startup_timeout(settings.startup_timeout)
        .with_pull_timeout(Some(settings.pull_timeout)))
    }

    /// Start the environment for this scenario and point the scraper at its published port.
    ///
    /// Blocks until the environment is ready. Cancelled if the matrix is stopped while waiting.
    pub fn launch(&mut self, spec: LaunchSpec) -> MatrixResult<()> {
        let volume = self.volume()?;
        let runtime = self.runner_context.container_runtime()?;

        let environment = self
            .runner_context
            .executor()
            .execute_in_place(Environment::launch(&runtime, volume, &spec))?;

        let host = match &self.runner_context.settings().scrape_host {
            Some(host) => host.clone(),
            None => environment.host(),
        };
        let port = environment.mapped_port(spec.exposed_port)?;
        self.resources.environment = Some(environment);
        self.set_scrape_target(host, port);

        Ok(())
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.resources.environment.as_ref()
    }

    /// Point the scraper at `host:port`. Done by [ScenarioContext::launch], or directly for an
    /// endpoint that is not managed by the runner.
    pub fn set_scrape_target(&mut self, host: impl Into<String>, port: u16) {
        let scraper = Scraper::new(host, port);
        log::info!("Scraping {} from '{}'", self.scenario, scraper.url());
        self.scraper = Some(scraper);
    }

    pub fn scraper(&self) -> MatrixResult<&Scraper> {
        self.scraper
            .as_ref()
            .context("No scrape target, the environment has not been launched")
    }

    /// A fresh scrape, bounded by the run's scrape timeout.
    pub fn scrape(&self) -> MatrixResult<ScrapeResult> {
        self.scraper()?
            .scrape(self.runner_context.settings().scrape_timeout)
    }

    /// The identifier the build-info metric should carry for this scenario's agent variant.
    pub fn expected_build_identifier(&self) -> String {
        self.runner_context
            .identifiers()
            .identifier_for(&self.scenario.agent_variant)
    }

    pub(crate) fn release(&mut self) {
        self.scraper = None;
        self.resources.release();
    }
}
