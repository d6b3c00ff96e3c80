use std::future::Future;

use compat_matrix_core::prelude::{MatrixResult, ShutdownHandle, ShutdownSignalError};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the matrix is shut down, and the call returns a
    /// [ShutdownSignalError]. Anything the future owns is dropped, so resources that release
    /// themselves on drop are still released.
    pub fn execute_in_place<T>(&self, fut: impl Future<Output = MatrixResult<T>>) -> MatrixResult<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                result = fut => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }
}
