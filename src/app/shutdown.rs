use super::{ComponentState, ParkwatchOrchestrator, SAMPLER, SERVER};
use crate::error::{ParkwatchError, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info};

const SAMPLER_STOP_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl ParkwatchOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // The sampler may be mid-inference; it finishes that cycle before exiting
        let sampler = self.sampler_handle.take();
        if let Err(e) = self.stop_component(SAMPLER, sampler, SAMPLER_STOP_TIMEOUT).await {
            error!("Error stopping sampler: {}", e);
            exit_code = 1;
        }

        let server = self.server_handle.take();
        if let Err(e) = self.stop_component(SERVER, server, SERVER_STOP_TIMEOUT).await {
            error!("Error stopping server: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for a component task to wind down after cancellation
    async fn stop_component(
        &self,
        component: &str,
        handle: Option<JoinHandle<()>>,
        limit: Duration,
    ) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let Some(handle) = handle else {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
            return Ok(());
        };

        match timeout(limit, handle).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component task failed: {}", component, e);
                Err(ParkwatchError::component(component, e.to_string()))
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(ParkwatchError::component(
                    component,
                    format!("stop timed out after {:?}", limit),
                ))
            }
        }
    }
}
