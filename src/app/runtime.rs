use super::{ParkwatchOrchestrator, ShutdownReason};
use crate::error::{ParkwatchError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl ParkwatchOrchestrator {
    /// Run until a shutdown signal arrives, then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("Parkwatch is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ParkwatchError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ParkwatchError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let server_handle = self.server_handle.as_mut();
        let server_exit = async move {
            match server_handle {
                Some(handle) => {
                    let _ = handle.await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        let shutdown_reason = tokio::select! {
            reason = shutdown_receiver => reason
                .map_err(|_| ParkwatchError::system("Shutdown channel closed unexpectedly"))?,
            _ = server_exit => {
                ShutdownReason::Error("API server stopped unexpectedly".to_string())
            }
        };

        if let ShutdownReason::Error(ref message) = shutdown_reason {
            error!("{}", message);
            // Already joined
            self.server_handle = None;
        }

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = match shutdown_reason {
            ShutdownReason::Error(_) => self.shutdown().await?.max(1),
            _ => self.shutdown().await?,
        };

        info!("Parkwatch shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd / container stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
