mod assertions;
mod cli;
mod context;
mod definition;
mod executor;
mod identifiers;
mod init;
mod lifecycle;
mod progress;
mod report;
mod run;
mod shutdown;

pub mod prelude {
    pub use crate::assertions::{
        assert_build_info_excludes, assert_build_info_identifier, assert_positive_value,
        assert_prefixes_present, assert_same_series, assert_well_formed,
    };
    pub use crate::cli::MatrixCli;
    pub use crate::context::{MatrixSettings, RunnerContext, ScenarioContext};
    pub use crate::definition::{HookResult, MatrixDefinitionBuilder, Scenario, ScenarioHook};
    pub use crate::executor::Executor;
    pub use crate::identifiers::BuildIdentifierTable;
    pub use crate::init::init;
    pub use crate::lifecycle::Phase;
    pub use crate::report::{
        CheckOutcome, FailureDetail, MatrixReport, ScenarioOutcome, ScenarioStatus,
    };
    pub use crate::run::run;

    pub use compat_matrix_core::prelude::{HarnessError, MatrixResult};
    pub use compat_matrix_environment::{LaunchSpec, Ulimit};
    pub use compat_matrix_scraper::ScrapeResult;
    pub use compat_matrix_volume::StagedFile;
}
