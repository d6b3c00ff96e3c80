mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{HarnessError, MatrixResult};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
