use clap::Parser;

use crate::cli::MatrixCli;

/// Initialise logging and parse the command line for a matrix binary.
pub fn init() -> MatrixCli {
    env_logger::init();

    MatrixCli::parse()
}
