//! OS signal handling.

use std::future::Future;

use tokio::signal;

use crate::lifecycle::shutdown::Shutdown;

/// Wait for SIGINT or SIGTERM and name the one received.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn await_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Trigger `shutdown` once `signal` resolves.
///
/// Returns whether the signal was the trigger that stopped the server.
pub async fn stop_on_signal(
    shutdown: Shutdown,
    signal: impl Future<Output = &'static str>,
) -> bool {
    let signal = signal.await;
    let stopped = shutdown.trigger(signal);
    if !stopped {
        tracing::debug!(signal, "Signal received during shutdown");
    }
    stopped
}
