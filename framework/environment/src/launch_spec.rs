use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use compat_matrix_core::prelude::MatrixResult;
use regex::Regex;

/// Where the volume is bound inside the container. Also the working directory of the command.
pub const MOUNT_POINT: &str = "/app";

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_NAME_PREFIX: &str = "compat-matrix";

/// A resource limit override applied when the container is created, `nofile=65536:65536` style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ulimit {
    pub name: String,
    pub soft: u64,
    pub hard: u64,
}

impl Ulimit {
    pub fn new(name: impl Into<String>, soft: u64, hard: u64) -> Self {
        Self {
            name: name.into(),
            soft,
            hard,
        }
    }
}

impl Display for Ulimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}:{}", self.name, self.soft, self.hard)
    }
}

/// Everything needed to start one environment.
///
/// The command line is opaque here. It is split on whitespace into the container command and
/// run from [MOUNT_POINT].
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub runtime_image: String,
    pub command: String,
    pub exposed_port: u16,
    pub readiness_pattern: Regex,
    /// Deadline for creating the container and seeing the readiness pattern.
    pub startup_timeout: Duration,
    /// If set, the image is pulled first with this deadline, which is separate from the startup.
    pub pull_timeout: Option<Duration>,
    pub ulimits: Vec<Ulimit>,
    pub name_prefix: String,
}

impl LaunchSpec {
    pub fn new(
        runtime_image: impl Into<String>,
        command: impl Into<String>,
        exposed_port: u16,
        readiness_pattern: &str,
    ) -> MatrixResult<Self> {
        let readiness_pattern = Regex::new(readiness_pattern)
            .with_context(|| format!("Invalid readiness pattern '{readiness_pattern}'"))?;

        Ok(Self {
            runtime_image: runtime_image.into(),
            command: command.into(),
            exposed_port,
            readiness_pattern,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            pull_timeout: None,
            ulimits: Vec::new(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        })
    }

    pub fn with_startup_timeout(mut self, startup_timeout: Duration) -> Self {
        self.startup_timeout = startup_timeout;
        self
    }

    pub fn with_pull_timeout(mut self, pull_timeout: Option<Duration>) -> Self {
        self.pull_timeout = pull_timeout;
        self
    }

    pub fn with_ulimit(mut self, ulimit: Ulimit) -> Self {
        self.ulimits.push(ulimit);
        self
    }

    pub fn with_name_prefix(mut self, name_prefix: impl Into<String>) -> Self {
        self.name_prefix = name_prefix.into();
        self
    }

    /// Arguments for `docker run` that start this spec detached as `container_name`.
    pub(crate) fn run_args(&self, host_path: &Path, container_name: &str) -> Vec<OsString> {
        let mut bind = OsString::from(host_path.as_os_str());
        bind.push(format!(":{MOUNT_POINT}:ro"));

        let mut args: Vec<OsString> = vec![
            "run".into(),
            "--detach".into(),
            "--name".into(),
            container_name.into(),
            "--volume".into(),
            bind,
            "--workdir".into(),
            MOUNT_POINT.into(),
            "--publish".into(),
            self.exposed_port.to_string().into(),
        ];
        for ulimit in &self.ulimits {
            args.push("--ulimit".into());
            args.push(ulimit.to_string().into());
        }
        args.push(self.runtime_image.clone().into());
        args.extend(self.command.split_whitespace().map(OsString::from));

        args
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn ulimit_display() {
        assert_eq!("nofile=65536:65536", Ulimit::new("nofile", 65536, 65536).to_string());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(LaunchSpec::new("openjdk:11-jre", "java -version", 9000, "(unclosed").is_err());
    }

    #[test]
    fn run_args_bind_read_only_and_publish_the_port() {
        let spec = LaunchSpec::new(
            "openjdk:11-jre",
            "java -javaagent:agent.jar=9000:config.yaml -jar jmx_example_application.jar",
            9000,
            ".*registered.*",
        )
        .unwrap()
        .with_ulimit(Ulimit::new("nofile", 65536, 65536));

        let args = spec
            .run_args(Path::new("/tmp/agent-integration-test-abc"), "compat-matrix-x1")
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(
            vec![
                "run",
                "--detach",
                "--name",
                "compat-matrix-x1",
                "--volume",
                "/tmp/agent-integration-test-abc:/app:ro",
                "--workdir",
                "/app",
                "--publish",
                "9000",
                "--ulimit",
                "nofile=65536:65536",
                "openjdk:11-jre",
                "java",
                "-javaagent:agent.jar=9000:config.yaml",
                "-jar",
                "jmx_example_application.jar",
            ],
            args
        );
    }
}
