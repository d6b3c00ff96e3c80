use std::path::{Path, PathBuf};

use anyhow::Context;
use compat_matrix_core::prelude::{HarnessError, MatrixResult};
use walkdir::WalkDir;

/// The module that builds the example application the agent is attached to.
pub const WORKLOAD_MODULE: &str = "jmx_example_application";

/// Jars with these classifiers sit next to the packaged artifact but are never the one under test.
const IGNORED_CLASSIFIERS: &[&str] = &["-sources", "-javadoc", "-tests"];

/// Where the inputs of a [crate::Volume] are read from.
///
/// Build outputs follow the Maven convention `<artifacts_dir>/<module>/target/<module>-<version>.jar`.
/// Configuration fixtures are plain files in `fixtures_dir` and are copied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    artifacts_dir: PathBuf,
    fixtures_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(artifacts_dir: impl Into<PathBuf>, fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            fixtures_dir: fixtures_dir.into(),
        }
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures_dir
    }

    /// Find the single packaged jar that `module` was built into.
    ///
    /// Fails with [HarnessError::ArtifactNotFound] if the module has not been built, and with
    /// [HarnessError::AmbiguousArtifact] if stale builds of other versions are lying around.
    pub fn resolve_module(&self, module: &str) -> MatrixResult<PathBuf> {
        let target_dir = self.artifacts_dir.join(module).join("target");
        if !target_dir.is_dir() {
            return Err(HarnessError::ArtifactNotFound {
                module: module.to_string(),
                searched: target_dir,
            }
            .into());
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(&target_dir).min_depth(1).max_depth(1) {
            let entry = entry
                .with_context(|| format!("Failed to list '{}'", target_dir.display()))?;
            if entry.file_type().is_file()
                && is_packaged_jar(module, &entry.file_name().to_string_lossy())
            {
                candidates.push(entry.into_path());
            }
        }
        candidates.sort();

        match candidates.len() {
            0 => Err(HarnessError::ArtifactNotFound {
                module: module.to_string(),
                searched: target_dir,
            }
            .into()),
            1 => {
                let artifact = candidates.remove(0);
                log::trace!("Resolved '{module}' to '{}'", artifact.display());
                Ok(artifact)
            }
            _ => Err(HarnessError::AmbiguousArtifact {
                module: module.to_string(),
                candidates,
            }
            .into()),
        }
    }

    /// Find a configuration fixture by file name.
    pub fn resolve_fixture(&self, name: &str) -> MatrixResult<PathBuf> {
        let fixture = self.fixtures_dir.join(name);
        if !fixture.is_file() {
            return Err(HarnessError::staging(format!(
                "Configuration fixture '{name}' not found in '{}'",
                self.fixtures_dir.display()
            ))
            .into());
        }

        Ok(fixture)
    }
}

/// `<module>-<version>.jar` where the version starts with a digit and carries no ignored classifier.
fn is_packaged_jar(module: &str, file_name: &str) -> bool {
    let Some(version) = file_name
        .strip_prefix(module)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".jar"))
    else {
        return false;
    };

    version.starts_with(|c: char| c.is_ascii_digit())
        && !IGNORED_CLASSIFIERS
            .iter()
            .any(|classifier| version.ends_with(classifier))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn touch(dir: &Path, module: &str, file_name: &str) -> PathBuf {
        let target = dir.join(module).join("target");
        fs::create_dir_all(&target).unwrap();
        let path = target.join(file_name);
        fs::write(&path, file_name).unwrap();
        path
    }

    #[test]
    fn packaged_jar_names() {
        assert!(is_packaged_jar("agent", "agent-0.20.0.jar"));
        assert!(is_packaged_jar("agent", "agent-1.0.0-SNAPSHOT.jar"));
        assert!(!is_packaged_jar("agent", "agent-0.20.0-sources.jar"));
        assert!(!is_packaged_jar("agent", "agent-0.20.0-javadoc.jar"));
        assert!(!is_packaged_jar("agent", "original-agent-0.20.0.jar"));
        assert!(!is_packaged_jar("agent", "agent_java6-0.20.0.jar"));
        assert!(!is_packaged_jar("agent", "agent-0.20.0.pom"));
        assert!(!is_packaged_jar("agent", "agent.jar"));
    }

    #[test]
    fn resolves_the_packaged_jar_only() {
        let tmp = tempfile::tempdir().unwrap();
        let expected = touch(tmp.path(), "jmx_prometheus_javaagent", "jmx_prometheus_javaagent-0.20.0.jar");
        touch(tmp.path(), "jmx_prometheus_javaagent", "jmx_prometheus_javaagent-0.20.0-sources.jar");
        touch(tmp.path(), "jmx_prometheus_javaagent", "original-jmx_prometheus_javaagent-0.20.0.jar");

        let layout = ArtifactLayout::new(tmp.path(), tmp.path().join("fixtures"));
        let resolved = layout.resolve_module("jmx_prometheus_javaagent").unwrap();

        assert_eq!(expected, resolved);
    }

    #[test]
    fn variants_do_not_shadow_each_other() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "jmx_prometheus_javaagent", "jmx_prometheus_javaagent-0.20.0.jar");
        let java6 = touch(
            tmp.path(),
            "jmx_prometheus_javaagent_java6",
            "jmx_prometheus_javaagent_java6-0.20.0.jar",
        );

        let layout = ArtifactLayout::new(tmp.path(), tmp.path());
        assert_eq!(java6, layout.resolve_module("jmx_prometheus_javaagent_java6").unwrap());
    }

    #[test]
    fn missing_module_is_artifact_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::new(tmp.path(), tmp.path());

        let err = layout.resolve_module("jmx_prometheus_javaagent").unwrap_err();
        match err.downcast_ref::<HarnessError>() {
            Some(HarnessError::ArtifactNotFound { module, searched }) => {
                assert_eq!("jmx_prometheus_javaagent", module);
                assert_eq!(&tmp.path().join("jmx_prometheus_javaagent").join("target"), searched);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_target_dir_is_artifact_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "agent", "agent-0.20.0-javadoc.jar");
        let layout = ArtifactLayout::new(tmp.path(), tmp.path());

        let err = layout.resolve_module("agent").unwrap_err();
        assert_eq!(
            "ArtifactNotFoundError",
            err.downcast_ref::<HarnessError>().unwrap().kind()
        );
    }

    #[test]
    fn stale_versions_are_ambiguous() {
        let tmp = tempfile::tempdir().unwrap();
        let old = touch(tmp.path(), "agent", "agent-0.19.0.jar");
        let new = touch(tmp.path(), "agent", "agent-0.20.0.jar");
        let layout = ArtifactLayout::new(tmp.path(), tmp.path());

        let err = layout.resolve_module("agent").unwrap_err();
        match err.downcast_ref::<HarnessError>() {
            Some(HarnessError::AmbiguousArtifact { candidates, .. }) => {
                assert_eq!(&vec![old, new], candidates);
            }
            other => panic!("Unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fixtures_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("config.yml"), "rules: []").unwrap();
        let layout = ArtifactLayout::new(tmp.path(), tmp.path());

        assert_eq!(tmp.path().join("config.yml"), layout.resolve_fixture("config.yml").unwrap());

        let err = layout.resolve_fixture("missing.yml").unwrap_err();
        assert_eq!("StagingError", err.downcast_ref::<HarnessError>().unwrap().kind());
    }
}
