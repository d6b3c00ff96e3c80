use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _};
use compat_matrix_core::prelude::MatrixResult;
use compat_matrix_volume::ArtifactLayout;
use serde::Serialize;

use crate::cli::MatrixCli;
use crate::context::{MatrixSettings, ScenarioContext};
use crate::identifiers::BuildIdentifierTable;

pub type HookResult = MatrixResult<()>;

pub type ScenarioHook = fn(&mut ScenarioContext) -> HookResult;

/// One cell of the matrix, a runtime image paired with an agent variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Scenario {
    pub runtime_image: String,
    pub agent_variant: String,
}

impl Scenario {
    pub fn new(runtime_image: impl Into<String>, agent_variant: impl Into<String>) -> Self {
        Self {
            runtime_image: runtime_image.into(),
            agent_variant: agent_variant.into(),
        }
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.runtime_image, self.agent_variant)
    }
}

/// The builder for a matrix definition.
///
/// This must be used in the `main` of a matrix binary to define the scenarios to run and what
/// each scenario does.
pub struct MatrixDefinitionBuilder {
    /// The name of the matrix.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// This value is initialised for you and you cannot change it.
    #[doc(hidden)]
    cli: MatrixCli,
    scenarios: Vec<Scenario>,
    identifiers: BuildIdentifierTable,
    default_artifacts_dir: Option<PathBuf>,
    default_fixtures_dir: Option<PathBuf>,
    /// Populates the scenario's volume. Run once per scenario, before the launch hook.
    stage_fn: Option<ScenarioHook>,
    /// Starts the environment against the staged volume and sets the scrape target.
    launch_fn: Option<ScenarioHook>,
    /// Named checks, run in the order they were added. Every check runs even if an earlier one
    /// failed.
    checks: Vec<(String, ScenarioHook)>,
}

pub(crate) struct MatrixDefinition {
    pub name: String,
    pub scenarios: Vec<Scenario>,
    pub identifiers: BuildIdentifierTable,
    pub settings: MatrixSettings,
    pub stage_fn: ScenarioHook,
    pub launch_fn: ScenarioHook,
    pub checks: Vec<(String, ScenarioHook)>,
    pub parallelism: usize,
    pub no_progress: bool,
    pub list: bool,
    pub summary_file: Option<PathBuf>,
    pub run_id: Option<String>,
}

impl MatrixDefinitionBuilder {
    /// Initialise a new matrix definition from the matrix name and command line arguments.
    /// See [MatrixDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str, cli: MatrixCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            scenarios: Vec::new(),
            identifiers: BuildIdentifierTable::default(),
            default_artifacts_dir: None,
            default_fixtures_dir: None,
            stage_fn: None,
            launch_fn: None,
            checks: Vec::new(),
        }
    }

    /// Add `(runtime_image, agent_variant)` pairs to the matrix, in the order they should run.
    pub fn with_scenarios(mut self, scenarios: &[(&str, &str)]) -> Self {
        self.scenarios.extend(
            scenarios
                .iter()
                .map(|(image, variant)| Scenario::new(*image, *variant)),
        );
        self
    }

    pub fn with_build_identifiers(mut self, identifiers: BuildIdentifierTable) -> Self {
        self.identifiers = identifiers;
        self
    }

    /// Where to find build outputs when `--artifacts-dir` is not given.
    pub fn with_default_artifacts_dir(mut self, artifacts_dir: impl Into<PathBuf>) -> Self {
        self.default_artifacts_dir = Some(artifacts_dir.into());
        self
    }

    /// Where to find configuration fixtures when `--fixtures-dir` is not given.
    pub fn with_default_fixtures_dir(mut self, fixtures_dir: impl Into<PathBuf>) -> Self {
        self.default_fixtures_dir = Some(fixtures_dir.into());
        self
    }

    /// Set the staging hook [MatrixDefinitionBuilder::stage_fn] for this matrix.
    pub fn use_stage(mut self, stage_fn: ScenarioHook) -> Self {
        self.stage_fn = Some(stage_fn);
        self
    }

    /// Set the launch hook [MatrixDefinitionBuilder::launch_fn] for this matrix.
    pub fn use_launch(mut self, launch_fn: ScenarioHook) -> Self {
        self.launch_fn = Some(launch_fn);
        self
    }

    /// Add a named check [MatrixDefinitionBuilder::checks] to this matrix.
    pub fn use_check(mut self, name: &str, check: ScenarioHook) -> Self {
        if self.checks.iter().any(|(existing, _)| existing == name) {
            panic!("Check [{}] is already defined", name);
        }

        self.checks.push((name.to_string(), check));
        self
    }

    pub(crate) fn build(self) -> MatrixResult<MatrixDefinition> {
        let artifacts_dir = self
            .cli
            .artifacts_dir
            .or(self.default_artifacts_dir)
            .context("No artifacts directory configured, pass --artifacts-dir")?;
        let fixtures_dir = self
            .cli
            .fixtures_dir
            .or(self.default_fixtures_dir)
            .context("No fixtures directory configured, pass --fixtures-dir")?;

        for image in &self.cli.image {
            if !self.scenarios.iter().any(|s| &s.runtime_image == image) {
                bail!("--image '{image}' does not match any scenario in the matrix");
            }
        }
        for variant in &self.cli.variant {
            if !self.scenarios.iter().any(|s| &s.agent_variant == variant) {
                bail!("--variant '{variant}' does not match any scenario in the matrix");
            }
        }

        let scenarios = self
            .scenarios
            .into_iter()
            .filter(|s| self.cli.image.is_empty() || self.cli.image.contains(&s.runtime_image))
            .filter(|s| self.cli.variant.is_empty() || self.cli.variant.contains(&s.agent_variant))
            .collect::<Vec<_>>();
        if scenarios.is_empty() {
            bail!("No scenarios selected to run");
        }

        let stage_fn = self
            .stage_fn
            .context("No staging hook defined, call `use_stage`")?;
        let launch_fn = self
            .launch_fn
            .context("No launch hook defined, call `use_launch`")?;
        if self.checks.is_empty() {
            bail!("No checks defined, call `use_check` at least once");
        }

        if self.cli.parallelism == 0 {
            bail!("--parallelism must be at least 1");
        }

        Ok(MatrixDefinition {
            name: self.name,
            scenarios,
            identifiers: self.identifiers,
            settings: MatrixSettings {
                layout: ArtifactLayout::new(artifacts_dir, fixtures_dir),
                startup_timeout: Duration::from_secs(self.cli.startup_timeout_s),
                pull_timeout: Duration::from_secs(self.cli.pull_timeout_s),
                scrape_timeout: Duration::from_millis(self.cli.scrape_timeout_ms),
                scrape_host: self.cli.scrape_host,
            },
            stage_fn,
            launch_fn,
            checks: self.checks,
            parallelism: self.cli.parallelism,
            no_progress: self.cli.no_progress,
            list: self.cli.list,
            summary_file: self.cli.summary_file,
            run_id: self.cli.run_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn noop(_ctx: &mut ScenarioContext) -> HookResult {
        Ok(())
    }

    fn builder(args: &[&str]) -> MatrixDefinitionBuilder {
        let cli = MatrixCli::parse_from(
            ["matrix", "--artifacts-dir", "/build", "--fixtures-dir", "/fixtures"]
                .iter()
                .chain(args)
                .copied(),
        );
        MatrixDefinitionBuilder::new("matrix", cli)
            .with_scenarios(&[
                ("openjdk:8-jre", "jmx_prometheus_javaagent"),
                ("openjdk:8-jre", "jmx_prometheus_javaagent_java6"),
                ("ticketfly/java:6", "jmx_prometheus_javaagent_java6"),
            ])
            .use_stage(noop)
            .use_launch(noop)
            .use_check("noop", noop)
    }

    #[test]
    fn filters_select_a_subset_in_table_order() {
        let definition = builder(&["--variant", "jmx_prometheus_javaagent_java6"])
            .build()
            .unwrap();

        assert_eq!(
            vec![
                Scenario::new("openjdk:8-jre", "jmx_prometheus_javaagent_java6"),
                Scenario::new("ticketfly/java:6", "jmx_prometheus_javaagent_java6"),
            ],
            definition.scenarios
        );
    }

    #[test]
    fn filters_combine() {
        let definition = builder(&[
            "--image",
            "openjdk:8-jre",
            "--variant",
            "jmx_prometheus_javaagent_java6",
        ])
        .build()
        .unwrap();

        assert_eq!(1, definition.scenarios.len());
    }

    #[test]
    fn unknown_filter_is_an_error() {
        let result = builder(&["--image", "openjdk:21"]).build();

        assert_eq!(
            "--image 'openjdk:21' does not match any scenario in the matrix",
            result.err().unwrap().to_string()
        );
    }

    #[test]
    fn filters_that_exclude_each_other_select_nothing() {
        let result = builder(&[
            "--image",
            "ticketfly/java:6",
            "--variant",
            "jmx_prometheus_javaagent",
        ])
        .build();

        assert!(result.is_err());
    }

    #[test]
    fn hooks_are_required() {
        let cli = MatrixCli::parse_from(["matrix", "--artifacts-dir", "/a", "--fixtures-dir", "/f"]);
        let result = MatrixDefinitionBuilder::new("matrix", cli)
            .with_scenarios(&[("openjdk:11-jre", "jmx_prometheus_javaagent")])
            .use_stage(noop)
            .use_check("noop", noop)
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn cli_overrides_default_directories() {
        let definition = builder(&[])
            .with_default_artifacts_dir("/default")
            .build()
            .unwrap();

        assert_eq!(
            PathBuf::from("/build"),
            definition.settings.layout.artifacts_dir()
        );
    }

    #[test]
    #[should_panic(expected = "Check [noop] is already defined")]
    fn duplicate_check_names_panic() {
        let _ = builder(&[]).use_check("noop", noop);
    }
}
