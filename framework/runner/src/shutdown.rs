use compat_matrix_core::prelude::{MatrixResult, ShutdownHandle};
use tokio::signal;

pub(crate) fn start_shutdown_listener(
    runtime: &tokio::runtime::Runtime,
) -> MatrixResult<ShutdownHandle> {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e:?}");
            return;
        }
        listener_handle.shutdown();
        println!("Received shutdown signal, finishing running scenarios...");
    });

    Ok(handle)
}
