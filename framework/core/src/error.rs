use std::path::PathBuf;
use std::time::Duration;

/// Recommended result type for hooks and framework code. Errors from this crate are wrapped in
/// [anyhow::Error] so they can carry context, and can be recovered with
/// [anyhow::Error::downcast_ref] to find out which part of a scenario failed.
pub type MatrixResult<T> = anyhow::Result<T>;

/// Every way a scenario can fail.
///
/// None of these are retried. A failure ends the scenario it happened in, the resources of that
/// scenario are released and the matrix moves on to the next scenario.
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    /// The staging directory could not be created or written to.
    #[error("Staging failed: {reason}")]
    Staging { reason: String },

    /// A build output is missing, which points at the build or packaging rather than the harness.
    #[error("No packaged artifact for '{module}' found in '{}'", .searched.display())]
    ArtifactNotFound { module: String, searched: PathBuf },

    /// More than one build output matched a module, so the one under test is not known.
    #[error("Found {} packaged artifacts for '{module}', expected exactly one: {candidates:?}", .candidates.len())]
    AmbiguousArtifact {
        module: String,
        candidates: Vec<PathBuf>,
    },

    /// The container could not be created, or it was not ready before the startup deadline.
    #[error("Environment '{image}' failed to start: {reason}")]
    EnvironmentStartup { image: String, reason: String },

    #[error("Scrape of '{url}' did not complete within {timeout:?}")]
    ScrapeTimeout { url: String, timeout: Duration },

    #[error("Could not connect to '{url}': {reason}")]
    ScrapeConnection { url: String, reason: String },

    #[error("Scrape of '{url}' failed: {reason}")]
    ScrapeProtocol { url: String, reason: String },

    /// The scraped data did not have an expected property.
    #[error("{0}")]
    AssertionFailure(String),
}

impl HarnessError {
    /// A stable name for the kind of failure, used when reporting outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::Staging { .. } => "StagingError",
            HarnessError::ArtifactNotFound { .. } => "ArtifactNotFoundError",
            HarnessError::AmbiguousArtifact { .. } => "AmbiguousArtifactError",
            HarnessError::EnvironmentStartup { .. } => "EnvironmentStartupError",
            HarnessError::ScrapeTimeout { .. } => "ScrapeTimeoutError",
            HarnessError::ScrapeConnection { .. } => "ScrapeConnectionError",
            HarnessError::ScrapeProtocol { .. } => "ScrapeProtocolError",
            HarnessError::AssertionFailure(_) => "AssertionFailure",
        }
    }

    pub fn staging(reason: impl Into<String>) -> Self {
        HarnessError::Staging {
            reason: reason.into(),
        }
    }

    pub fn startup(image: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::EnvironmentStartup {
            image: image.into(),
            reason: reason.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        HarnessError::AssertionFailure(message.into())
    }
}
