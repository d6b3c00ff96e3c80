//! Staging of the files an environment needs, isolated per scenario.
//!
//! A [Volume] is a fresh temporary directory that is populated from an [ArtifactLayout] and then
//! bound read-only into the environment under test. It is removed when the scenario is torn down.

mod layout;
mod volume;

pub use layout::{ArtifactLayout, WORKLOAD_MODULE};
pub use volume::{StagedFile, Volume};
