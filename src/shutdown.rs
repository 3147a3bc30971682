use std::future::pending;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Returns a token that is cancelled on SIGINT or SIGTERM.
pub fn on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt() => {}
            _ = terminate() => {}
        }
        info!("shutdown requested");
        cancel.cancel();
    });

    token
}

async fn interrupt() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to listen for SIGINT: {err}");
        pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use signal::unix::{SignalKind, signal as unix_signal};

    match unix_signal(SignalKind::terminate()) {
        Ok(mut s) => {
            s.recv().await;
        }
        Err(err) => {
            error!("failed to listen for SIGTERM: {err}");
            pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    pending::<()>().await;
}
