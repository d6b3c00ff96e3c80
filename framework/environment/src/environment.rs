use std::time::Duration;

use anyhow::{bail, Context};
use compat_matrix_core::prelude::{HarnessError, MatrixResult};
use compat_matrix_volume::Volume;
use nanoid::nanoid;
use tokio::time::{timeout, timeout_at, Instant};

use crate::launch_spec::LaunchSpec;
use crate::readiness::{wait_for_readiness, LogStream, ReadinessFailure};
use crate::runtime::ContainerRuntime;

const NAME_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    Starting,
    Ready,
    Failed,
    Stopped,
}

/// A running container with the workload and agent inside, owned by one scenario.
///
/// [Environment::launch] only ever returns an environment that is [EnvironmentState::Ready]. The
/// container is removed by [Environment::stop], or on [Drop::drop].
#[derive(Debug)]
pub struct Environment {
    runtime: ContainerRuntime,
    container_name: String,
    runtime_image: String,
    exposed_port: u16,
    mapped_port: Option<u16>,
    state: EnvironmentState,
}

impl Environment {
    /// Start `spec` against a fully staged `volume` and wait for it to become ready.
    ///
    /// Fails with [HarnessError::EnvironmentStartup] if the container cannot be created or the
    /// readiness pattern is not logged before the startup deadline. A partially started container
    /// is removed before the error is returned.
    pub async fn launch(
        runtime: &ContainerRuntime,
        volume: &Volume,
        spec: &LaunchSpec,
    ) -> MatrixResult<Self> {
        volume.ensure_complete()?;

        if let Some(pull_timeout) = spec.pull_timeout {
            pull_image(runtime, &spec.runtime_image, pull_timeout).await?;
        }

        let mut environment = Self {
            runtime: runtime.clone(),
            container_name: format!("{}-{}", spec.name_prefix, nanoid!(10, &NAME_ALPHABET)),
            runtime_image: spec.runtime_image.clone(),
            exposed_port: spec.exposed_port,
            mapped_port: None,
            state: EnvironmentState::Starting,
        };

        let deadline = Instant::now() + spec.startup_timeout;
        match environment.start(volume, spec, deadline).await {
            Ok(()) => Ok(environment),
            Err(e) => {
                environment.state = EnvironmentState::Failed;
                if let Err(stop_err) = environment.stop() {
                    log::error!(
                        "Failed to remove container '{}' after it failed to start: {stop_err:?}",
                        environment.container_name
                    );
                }
                Err(HarnessError::startup(&spec.runtime_image, format!("{e:#}")).into())
            }
        }
    }

    async fn start(
        &mut self,
        volume: &Volume,
        spec: &LaunchSpec,
        deadline: Instant,
    ) -> MatrixResult<()> {
        log::info!(
            "Starting '{}' as container '{}'",
            self.runtime_image,
            self.container_name
        );
        log::debug!("Command: {}", spec.command);

        timeout_at(
            deadline,
            self.runtime
                .output(spec.run_args(volume.host_path(), &self.container_name)),
        )
        .await
        .with_context(|| {
            format!(
                "Container was not created within {:?}",
                spec.startup_timeout
            )
        })?
        .context("Failed to create container")?;

        let mut logs = LogStream::follow(&self.runtime, &self.container_name)?;
        let log_target = format!("environment::{}", self.container_name);

        match wait_for_readiness(&mut logs.lines, &spec.readiness_pattern, deadline, &log_target)
            .await
        {
            Ok(()) => {}
            Err(ReadinessFailure::TimedOut) => bail!(
                "Readiness pattern '{}' was not logged within {:?}",
                spec.readiness_pattern,
                spec.startup_timeout
            ),
            Err(ReadinessFailure::StreamClosed) => bail!(
                "Container exited before logging readiness pattern '{}'",
                spec.readiness_pattern
            ),
        }

        let port_spec = format!("{}/tcp", self.exposed_port);
        let port_output = timeout_at(
            deadline,
            self.runtime
                .output(["port", self.container_name.as_str(), port_spec.as_str()]),
        )
        .await
        .context("Timed-out whilst looking up the published port")?
        .context("Failed to look up the published port")?;
        let mapped_port = parse_port_mapping(&port_output)
            .with_context(|| format!("No host port published for {port_spec}: '{port_output}'"))?;

        self.mapped_port = Some(mapped_port);
        self.state = EnvironmentState::Ready;
        log::info!(
            "Container '{}' is ready, port {} is published on {mapped_port}",
            self.container_name,
            self.exposed_port
        );

        logs.forward_to_log(log_target);

        Ok(())
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn runtime_image(&self) -> &str {
        &self.runtime_image
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    /// The host the published ports are reachable on.
    pub fn host(&self) -> String {
        self.runtime.host()
    }

    /// The externally reachable port the runtime assigned to `internal_port`.
    pub fn mapped_port(&self, internal_port: u16) -> MatrixResult<u16> {
        if internal_port != self.exposed_port {
            bail!(
                "Port {internal_port} is not exposed by container '{}', only {} is",
                self.container_name,
                self.exposed_port
            );
        }

        self.mapped_port.with_context(|| {
            format!(
                "Container '{}' has no published port",
                self.container_name
            )
        })
    }

    /// Remove the container. Stopping an environment that is already stopped does nothing.
    pub fn stop(&mut self) -> MatrixResult<()> {
        if self.state == EnvironmentState::Stopped {
            return Ok(());
        }

        log::debug!("Removing container '{}'", self.container_name);
        self.runtime.remove_container(&self.container_name)?;
        self.state = EnvironmentState::Stopped;
        log::info!("Removed container '{}'", self.container_name);

        Ok(())
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("{e:?}");
        }
    }
}

async fn pull_image(
    runtime: &ContainerRuntime,
    image: &str,
    pull_timeout: Duration,
) -> MatrixResult<()> {
    log::info!("Pulling image '{image}'");
    match timeout(pull_timeout, runtime.output(["pull", image])).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(HarnessError::startup(image, format!("Pull failed: {e:#}")).into()),
        Err(_) => Err(HarnessError::startup(
            image,
            format!("Pull did not complete within {pull_timeout:?}"),
        )
        .into()),
    }
}

/// Read the host port from `docker port` output such as `0.0.0.0:49153` and `[::]:49153`.
fn parse_port_mapping(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}
