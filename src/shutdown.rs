use std::future::Future;

/// Resolves once the process is asked to stop (SIGINT or SIGTERM).
///
/// Handlers are installed when this is called, not when the future is first polled, so a signal
/// that arrives while the listener is still starting up is not lost. If they cannot be installed
/// the server keeps running until killed.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt());
    let terminate = signal(SignalKind::terminate());

    async move {
        match (interrupt, terminate) {
            (Ok(mut interrupt), Ok(mut terminate)) => {
                tokio::select! {
                    _ = interrupt.recv() => tracing::info!("SIGINT received, shutting down"),
                    _ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
                }
            }
            (Err(error), _) | (_, Err(error)) => {
                tracing::error!("Can't listen for shutdown signal: {error}");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> impl Future<Output = ()> {
    async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl-C received, shutting down"),
            Err(error) => {
                tracing::error!("Can't listen for shutdown signal: {error}");
                std::future::pending::<()>().await;
            }
        }
    }
}
