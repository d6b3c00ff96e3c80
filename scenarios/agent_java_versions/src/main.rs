use std::path::Path;

use anyhow::bail;
use compat_matrix_runner::prelude::*;

mod checks;
mod matrix;

const AGENT_PORT: u16 = 9000;
const VOLUME_PREFIX: &str = "agent-integration-test-";
const CONFIG_FIXTURE: &str = "config.yml";
/// Logged by the example application once its MBeans are registered.
const READINESS_PATTERN: &str = ".*registered.*";
/// The ticketfly/java:6 image needs more file descriptors than its default to start.
const NOFILE_LIMIT: u64 = 65536;

fn agent_command() -> String {
    format!(
        "java -javaagent:{}={AGENT_PORT}:{} -jar {}",
        StagedFile::AgentArtifact.file_name(),
        StagedFile::Config.file_name(),
        StagedFile::WorkloadArtifact.file_name()
    )
}

fn stage(ctx: &mut ScenarioContext) -> HookResult {
    let layout = ctx.layout().clone();
    let variant = ctx.scenario().agent_variant.clone();

    let volume = ctx.stage_volume(VOLUME_PREFIX)?;
    volume.copy_agent_artifact(&layout, &variant)?;
    volume.copy_config(&layout, CONFIG_FIXTURE)?;
    volume.copy_workload_artifact(&layout)?;

    Ok(())
}

fn launch(ctx: &mut ScenarioContext) -> HookResult {
    let spec = ctx
        .launch_spec(&agent_command(), AGENT_PORT, READINESS_PATTERN)?
        .with_ulimit(Ulimit::new("nofile", NOFILE_LIMIT, NOFILE_LIMIT));

    ctx.launch(spec)
}

fn main() -> MatrixResult<()> {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let builder = MatrixDefinitionBuilder::new(env!("CARGO_PKG_NAME"), init())
        .with_scenarios(matrix::SCENARIOS)
        .with_build_identifiers(matrix::build_identifiers())
        .with_default_artifacts_dir(manifest_dir.join("../.."))
        .with_default_fixtures_dir(manifest_dir.join("fixtures"))
        .use_stage(stage)
        .use_launch(launch)
        .use_check("jvm_metric", checks::jvm_metric)
        .use_check("tabular_metrics", checks::tabular_metrics)
        .use_check("build_info_name", checks::build_info_name)
        .use_check("build_version_not_unknown", checks::build_version_not_unknown)
        .use_check("well_formed_output", checks::well_formed_output)
        .use_check("stable_series", checks::stable_series);

    let failed = run(builder)?;
    if failed > 0 {
        bail!("{failed} scenarios did not pass");
    }

    log::info!("All scenarios passed");

    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn agent_is_attached_to_the_staged_workload() {
        assert_eq!(
            "java -javaagent:agent.jar=9000:config.yaml -jar jmx_example_application.jar",
            agent_command()
        );
    }

    #[test]
    fn bundled_config_fixture_exists() {
        assert!(Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join(CONFIG_FIXTURE)
            .is_file());
    }
}
