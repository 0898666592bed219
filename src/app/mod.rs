mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::ParkwatchOrchestrator;
pub use types::{ComponentState, ShutdownReason};

/// Component names used for lifecycle tracking
pub const SAMPLER: &str = "sampler";
pub const SERVER: &str = "server";
