use super::{ComponentState, ParkwatchOrchestrator, SAMPLER, SERVER};
use std::collections::HashMap;
use tracing::{debug, info, warn};

impl ParkwatchOrchestrator {
    /// Record a lifecycle transition and return the state it replaced
    pub async fn set_component_state(
        &self,
        component: &str,
        state: ComponentState,
    ) -> Option<ComponentState> {
        let mut states = self.component_states.lock().await;
        let previous = states.insert(component.to_string(), state.clone());

        match (&previous, &state) {
            (Some(from), to) if from == to => {}
            (_, ComponentState::Failed) => {
                warn!("{} failed (was {:?})", component, previous);
            }
            (Some(ComponentState::Starting), ComponentState::Running) => {
                info!("{} is running", component);
            }
            (Some(ComponentState::Stopping), ComponentState::Stopped) => {
                info!("{} has stopped", component);
            }
            _ => debug!("{}: {:?} -> {:?}", component, previous, state),
        }

        previous
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        let states = self.component_states.lock().await;
        states.get(component).cloned()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        let states = self.component_states.lock().await;
        states.clone()
    }

    /// True once both the API server and the stats sampler are running
    pub async fn is_serving(&self) -> bool {
        let states = self.component_states.lock().await;
        [SERVER, SAMPLER]
            .iter()
            .all(|name| states.get(*name) == Some(&ComponentState::Running))
    }
}
