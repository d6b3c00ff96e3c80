use std::env;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use compat_matrix_core::prelude::MatrixResult;
use tokio::process::Command;
use url::Url;

/// Environment variable to override the path to the `docker` binary used to run environments.
pub const CM_DOCKER_PATH_ENV: &str = "CM_DOCKER_PATH";

const DEFAULT_REMOVE_TIMEOUT: Duration = Duration::from_secs(30);
const REMOVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The container runtime, driven through the `docker` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRuntime {
    bin_path: PathBuf,
    remove_timeout: Duration,
}

impl ContainerRuntime {
    pub fn new(bin_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: bin_path.into(),
            remove_timeout: DEFAULT_REMOVE_TIMEOUT,
        }
    }

    /// How long removing a container may take before it is given up on.
    pub fn with_remove_timeout(mut self, remove_timeout: Duration) -> Self {
        self.remove_timeout = remove_timeout;
        self
    }

    /// Locate the `docker` binary.
    ///
    /// If the [`CM_DOCKER_PATH_ENV`] environment variable is set, its value is used as the path to
    /// the binary. Otherwise `docker` is looked up in the user's `PATH`.
    pub fn from_env() -> MatrixResult<Self> {
        match env::var(CM_DOCKER_PATH_ENV).ok().as_deref() {
            Some("") => {
                bail!("'{CM_DOCKER_PATH_ENV}' set to empty string");
            }
            Some("docker") | None => {
                log::debug!("'{CM_DOCKER_PATH_ENV}' is not a path so looking in user's 'PATH'");
                which::which("docker").map(Self::new).with_context(|| {
                    format!(
                        "Docker binary not found in PATH. Please install Docker or set '{CM_DOCKER_PATH_ENV}' to the correct path."
                    )
                })
            }
            Some(path) => {
                let bin_path = PathBuf::from(path);
                if !bin_path.exists() {
                    bail!(
                        "Path to Docker binary overwritten with '{CM_DOCKER_PATH_ENV}={path}' but that path doesn't exist",
                        path = bin_path.display()
                    );
                }
                Ok(Self::new(bin_path))
            }
        }
    }

    pub fn bin_path(&self) -> &Path {
        &self.bin_path
    }

    /// The host that ports published by this runtime are reachable on.
    ///
    /// Taken from a `tcp://` `DOCKER_HOST`, otherwise the daemon is local.
    pub fn host(&self) -> String {
        env::var("DOCKER_HOST")
            .ok()
            .and_then(|docker_host| host_from_docker_host(&docker_host))
            .unwrap_or_else(|| "localhost".to_string())
    }

    pub(crate) fn command(&self) -> Command {
        let mut command = Command::new(&self.bin_path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run a docker subcommand to completion and return its trimmed stdout.
    pub(crate) async fn output<I, S>(&self, args: I) -> MatrixResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = self.command();
        command.args(args);
        log::trace!("Running {command:?}");

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'", self.bin_path.display()))?;
        if !output.status.success() {
            bail!(
                "'{}' exited with {}: {}",
                self.bin_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Force-remove a container, treating one that no longer exists as removed.
    ///
    /// Blocking, so that it can run from [Drop::drop]. Gives up once the remove timeout passes
    /// and leaves the container behind.
    pub(crate) fn remove_container(&self, name: &str) -> MatrixResult<()> {
        let mut child = std::process::Command::new(&self.bin_path)
            .args(["rm", "--force", "--volumes", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute '{}'", self.bin_path.display()))?;

        let deadline = Instant::now() + self.remove_timeout;
        let status = loop {
            if let Some(status) = child
                .try_wait()
                .with_context(|| format!("Failed to wait for removal of container '{name}'"))?
            {
                break status;
            }

            if Instant::now() >= deadline {
                if let Err(e) = child.kill().and_then(|()| child.wait()) {
                    log::warn!("Failed to kill removal of container '{name}': {e}");
                }
                bail!(
                    "Container '{name}' was not removed within {:?}",
                    self.remove_timeout
                );
            }

            std::thread::sleep(REMOVE_POLL_INTERVAL);
        };

        if status.success() {
            return Ok(());
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            if let Err(e) = pipe.read_to_string(&mut stderr) {
                log::debug!("Could not read the output of 'rm' for container '{name}': {e}");
            }
        }
        if stderr.contains("No such container") {
            return Ok(());
        }

        bail!("Failed to remove container '{name}': {}", stderr.trim())
    }
}

fn host_from_docker_host(docker_host: &str) -> Option<String> {
    let url = Url::parse(docker_host).ok()?;
    if url.scheme() != "tcp" {
        return None;
    }

    url.host_str().map(ToString::to_string)
}
