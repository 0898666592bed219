mod api;
mod handlers;
mod push;
#[cfg(test)]
mod tests;

pub use api::{cors_layer, router, ApiServer, ApiServerBuilder, RunningServer, ServerState, DEV_ORIGINS};
