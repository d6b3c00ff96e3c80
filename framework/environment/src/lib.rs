//! Runs the workload, with the agent attached, inside a container bound to a staged
//! [compat_matrix_volume::Volume].

mod environment;
mod launch_spec;
mod readiness;
mod runtime;

pub use environment::{Environment, EnvironmentState};
pub use launch_spec::{LaunchSpec, Ulimit, MOUNT_POINT};
pub use runtime::{ContainerRuntime, CM_DOCKER_PATH_ENV};
