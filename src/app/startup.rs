use super::{ComponentState, ParkwatchOrchestrator, SAMPLER, SERVER};
use crate::error::{ParkwatchError, Result};
use tracing::{error, info};

impl ParkwatchOrchestrator {
    /// Register all components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing parkwatch components");

        let mut states = self.component_states.lock().await;
        states.insert(SERVER.to_string(), ComponentState::Stopped);
        states.insert(SAMPLER.to_string(), ComponentState::Stopped);
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Bind the API and start the stats sampler
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting parkwatch");

        // Bind first so a taken port aborts before any background work starts
        let server = self
            .server
            .take()
            .ok_or_else(|| ParkwatchError::system("API server already started"))?;

        self.set_component_state(SERVER, ComponentState::Starting).await;
        let running = match server.start(self.cancellation_token.child_token()).await {
            Ok(running) => running,
            Err(e) => {
                self.set_component_state(SERVER, ComponentState::Failed).await;
                error!("Failed to start API server: {}", e);
                return Err(e);
            }
        };
        self.local_addr = Some(running.local_addr);
        self.server_handle = Some(running.handle);
        self.set_component_state(SERVER, ComponentState::Running).await;

        let sampler = self
            .sampler
            .take()
            .ok_or_else(|| ParkwatchError::system("Stats sampler already started"))?;

        self.set_component_state(SAMPLER, ComponentState::Starting).await;
        self.sampler_handle = Some(sampler.spawn(self.cancellation_token.child_token()));
        self.set_component_state(SAMPLER, ComponentState::Running).await;

        if self.is_serving().await {
            info!("Parkwatch started successfully");
        }
        Ok(())
    }
}
