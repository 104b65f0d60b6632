use crate::engine::Latch;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Fires `interrupted` on Ctrl-C (or SIGTERM on unix).
pub(crate) fn setup_signal_handler(interrupted: Latch) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut term_signal = match signal(SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(err) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", err);
                None
            }
        };

        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(err) = result {
                        tracing::warn!("Failed to listen for Ctrl-C: {}", err);
                        return;
                    }
                }
                () = async {
                    if let Some(signal) = term_signal.as_mut() {
                        signal.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                } => {}
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl-C: {}", err);
                return;
            }
        }

        tracing::info!("Interrupt received, stopping the run.");
        interrupted.fire();
    })
}
