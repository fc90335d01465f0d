//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

/// Handles shutdown signals (SIGTERM, SIGINT)
pub struct ShutdownSignal;

impl ShutdownSignal {
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    pub async fn wait(&self) {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(?e, "failed to register SIGTERM handler, using Ctrl-C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(?e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(?e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
                debug!("received SIGINT");
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
