use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use compat_matrix_core::prelude::{HarnessError, MatrixResult};
use tempfile::TempDir;

use crate::layout::{ArtifactLayout, WORKLOAD_MODULE};

/// The roles a [Volume] has to fill before an environment can be launched against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StagedFile {
    AgentArtifact,
    Config,
    WorkloadArtifact,
}

impl StagedFile {
    pub const ALL: [StagedFile; 3] = [
        StagedFile::AgentArtifact,
        StagedFile::Config,
        StagedFile::WorkloadArtifact,
    ];

    /// The fixed name the file is staged under, which is what the launch command refers to.
    pub fn file_name(self) -> &'static str {
        match self {
            StagedFile::AgentArtifact => "agent.jar",
            StagedFile::Config => "config.yaml",
            StagedFile::WorkloadArtifact => "jmx_example_application.jar",
        }
    }
}

impl Display for StagedFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StagedFile::AgentArtifact => write!(f, "agent-artifact"),
            StagedFile::Config => write!(f, "config"),
            StagedFile::WorkloadArtifact => write!(f, "workload-artifact"),
        }
    }
}

/// A staging directory owned by exactly one scenario.
///
/// The directory is removed by [Volume::close], or on [Drop::drop] if it was never closed, so it
/// is released on every exit path of the scenario.
#[derive(Debug)]
pub struct Volume {
    dir: Option<TempDir>,
    host_path: PathBuf,
    staged: BTreeSet<StagedFile>,
}

impl Volume {
    /// Create a fresh, uniquely named staging directory in the system temp directory.
    pub fn create(prefix: &str) -> MatrixResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| {
                HarnessError::staging(format!(
                    "Failed to create staging directory with prefix '{prefix}': {e}"
                ))
            })?;

        // The directory is bound into a container that may not run as the current user.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;

            fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).map_err(|e| {
                HarnessError::staging(format!(
                    "Failed to open up permissions on '{}': {e}",
                    dir.path().display()
                ))
            })?;
        }

        let host_path = dir.path().to_path_buf();
        log::debug!("Created volume at '{}'", host_path.display());

        Ok(Self {
            dir: Some(dir),
            host_path,
            staged: BTreeSet::new(),
        })
    }

    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// Where `file` lives, or will live once staged, on the host.
    pub fn path_of(&self, file: StagedFile) -> PathBuf {
        self.host_path.join(file.file_name())
    }

    /// Copy the build of the agent `variant` into the volume as [StagedFile::AgentArtifact].
    pub fn copy_agent_artifact(
        &mut self,
        layout: &ArtifactLayout,
        variant: &str,
    ) -> MatrixResult<()> {
        let artifact = layout.resolve_module(variant)?;
        self.stage(StagedFile::AgentArtifact, &artifact)
    }

    /// Copy the configuration fixture `name` into the volume as [StagedFile::Config].
    pub fn copy_config(&mut self, layout: &ArtifactLayout, name: &str) -> MatrixResult<()> {
        let fixture = layout.resolve_fixture(name)?;
        self.stage(StagedFile::Config, &fixture)
    }

    /// Copy the example workload into the volume as [StagedFile::WorkloadArtifact].
    pub fn copy_workload_artifact(&mut self, layout: &ArtifactLayout) -> MatrixResult<()> {
        let artifact = layout.resolve_module(WORKLOAD_MODULE)?;
        self.stage(StagedFile::WorkloadArtifact, &artifact)
    }

    fn stage(&mut self, file: StagedFile, source: &Path) -> MatrixResult<()> {
        let dir = self.dir.as_ref().ok_or_else(|| {
            HarnessError::staging(format!(
                "Volume '{}' is already closed",
                self.host_path.display()
            ))
        })?;

        let destination = dir.path().join(file.file_name());
        fs::copy(source, &destination).map_err(|e| {
            HarnessError::staging(format!(
                "Failed to copy '{}' to '{}': {e}",
                source.display(),
                destination.display()
            ))
        })?;

        log::trace!("Staged {file} from '{}'", source.display());
        self.staged.insert(file);

        Ok(())
    }

    pub fn is_staged(&self, file: StagedFile) -> bool {
        self.staged.contains(&file)
    }

    pub fn missing(&self) -> Vec<StagedFile> {
        StagedFile::ALL
            .into_iter()
            .filter(|file| !self.staged.contains(file))
            .collect()
    }

    /// Check that every [StagedFile] role is filled. An environment must not be launched otherwise.
    pub fn ensure_complete(&self) -> MatrixResult<()> {
        if self.is_closed() {
            return Err(HarnessError::staging(format!(
                "Volume '{}' is already closed",
                self.host_path.display()
            ))
            .into());
        }

        let missing = self.missing();
        if !missing.is_empty() {
            let missing = missing
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(HarnessError::staging(format!(
                "Volume '{}' is missing: {missing}",
                self.host_path.display()
            ))
            .into());
        }

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the staging directory and everything in it.
    ///
    /// Safe to call after a partial staging and safe to call more than once.
    pub fn close(&mut self) -> MatrixResult<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        dir.close().map_err(|e| {
            HarnessError::staging(format!(
                "Failed to remove volume '{}': {e}",
                self.host_path.display()
            ))
        })?;
        log::debug!("Removed volume at '{}'", self.host_path.display());

        Ok(())
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{e:?}");
        }
    }
}
