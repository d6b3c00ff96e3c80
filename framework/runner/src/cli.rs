use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct MatrixCli {
    /// Root of the build output layout, where each module's packaged jar is found under
    /// `<artifacts-dir>/<module>/target/`.
    ///
    /// Defaults to the directory configured by the scenario, usually the root of the build.
    #[clap(long)]
    pub artifacts_dir: Option<PathBuf>,

    /// Directory holding the agent configuration fixtures.
    #[clap(long)]
    pub fixtures_dir: Option<PathBuf>,

    /// Only run scenarios for this runtime image. Can be given multiple times.
    ///
    /// Every value must match at least one scenario in the matrix.
    #[clap(long)]
    pub image: Vec<String>,

    /// Only run scenarios for this agent variant. Can be given multiple times.
    ///
    /// Every value must match at least one scenario in the matrix.
    #[clap(long)]
    pub variant: Vec<String>,

    /// How many scenarios to run at the same time. Each scenario owns its own volume and container.
    #[clap(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Seconds to wait for a container to log its readiness pattern
    #[clap(long, default_value_t = 120)]
    pub startup_timeout_s: u64,

    /// Seconds to wait for a runtime image to be pulled, separate from the startup timeout
    #[clap(long, default_value_t = 600)]
    pub pull_timeout_s: u64,

    /// Milliseconds to wait for a single scrape of the metrics endpoint
    #[clap(long, default_value_t = 10_000)]
    pub scrape_timeout_ms: u64,

    /// The host that published container ports are reachable on.
    ///
    /// Defaults to `localhost`, or the host of a `tcp://` `DOCKER_HOST`.
    #[clap(long)]
    pub scrape_host: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Write a JSON summary of the run to this file
    #[clap(long)]
    pub summary_file: Option<PathBuf>,

    /// An id for this run, recorded in the summary. A random id is used if not given.
    #[clap(long)]
    pub run_id: Option<String>,

    /// Print the scenarios that would run and exit
    #[clap(long, default_value = "false")]
    pub list: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = MatrixCli::parse_from(["agent_java_versions"]);

        assert_eq!(1, cli.parallelism);
        assert_eq!(120, cli.startup_timeout_s);
        assert_eq!(600, cli.pull_timeout_s);
        assert_eq!(10_000, cli.scrape_timeout_ms);
        assert!(cli.image.is_empty());
        assert!(cli.scrape_host.is_none());
        assert!(!cli.list);
    }

    #[test]
    fn repeated_filters() {
        let cli = MatrixCli::parse_from([
            "agent_java_versions",
            "--image",
            "openjdk:11-jre",
            "--image",
            "openjdk:17",
            "--variant",
            "jmx_prometheus_javaagent",
        ]);

        assert_eq!(vec!["openjdk:11-jre", "openjdk:17"], cli.image);
        assert_eq!(vec!["jmx_prometheus_javaagent"], cli.variant);
    }
}
