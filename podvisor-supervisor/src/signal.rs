//! Translation of termination signals into cancellation of the lifetime scope

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `lifetime` on the first SIGINT or SIGTERM.
///
/// Handlers are installed before this returns, so no signal is lost to the
/// default disposition once the call succeeds.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
#[cfg(unix)]
pub fn spawn_signal_listener(lifetime: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => info!("received SIGTERM"),
            _ = interrupt.recv() => info!("received SIGINT"),
            _ = lifetime.cancelled() => return,
        }
        lifetime.cancel();
    }))
}

#[cfg(not(unix))]
pub fn spawn_signal_listener(lifetime: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    info!("received Ctrl-C");
                    lifetime.cancel();
                }
            }
            _ = lifetime.cancelled() => {}
        }
    }))
}
