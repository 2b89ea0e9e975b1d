use tokio::signal;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `token` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            received = wait_for_signal() => {
                if received {
                    token.cancel();
                }
            }
        }
    })
}

async fn wait_for_signal() -> bool {
    #[cfg(unix)]
    {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("Failed to create SIGTERM handler: {}", err);
                return wait_for_ctrl_c().await;
            }
        };

        tokio::select! {
            received = wait_for_ctrl_c() => received,
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                true
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await
    }
}

async fn wait_for_ctrl_c() -> bool {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            true
        }
        Err(err) => {
            error!("Failed to listen for SIGINT: {}", err);
            false
        }
    }
}
