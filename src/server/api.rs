use crate::{
    config::ParkwatchConfig,
    detector::Detector,
    error::{ParkwatchError, Result, StreamError},
    notify::NotificationBus,
    source::SourceAdapter,
    stats::StatsStore,
};
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use super::handlers::{
    health_handler, slot_stats_handler, system_metrics_handler, video_feed_1_handler,
    video_feed_2_handler,
};
use super::push::ws_handler;

/// Development front-end origins that are always allowed
pub const DEV_ORIGINS: [&str; 4] = [
    "http://localhost:3007",
    "http://localhost:3006",
    "http://localhost:3008",
    "http://127.0.0.1:3007",
];

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) config: Arc<ParkwatchConfig>,
    pub(crate) store: Arc<StatsStore>,
    pub(crate) bus: Arc<NotificationBus>,
    pub(crate) adapter: SourceAdapter,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) placeholder_interval: Duration,
}

impl ServerState {
    pub fn new(
        config: Arc<ParkwatchConfig>,
        store: Arc<StatsStore>,
        bus: Arc<NotificationBus>,
        adapter: SourceAdapter,
        detector: Arc<dyn Detector>,
    ) -> Self {
        let placeholder_interval =
            Duration::from_micros(1_000_000u64 / config.stream.placeholder_fps.max(1) as u64);

        Self {
            config,
            store,
            bus,
            adapter,
            detector,
            placeholder_interval,
        }
    }
}

/// Build the full route table with CORS applied
pub fn router(state: ServerState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origin);

    Router::new()
        .route("/health", get(health_handler))
        .route("/slot_stats", get(slot_stats_handler))
        .route("/system_metrics", get(system_metrics_handler))
        .route("/video_feed_1", get(video_feed_1_handler))
        .route("/video_feed_2", get(video_feed_2_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// CORS for the dashboard: the configured origin plus local development hosts
pub fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origin.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = std::iter::once(allowed_origin.trim())
        .chain(DEV_ORIGINS)
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}

/// A server that has bound its socket and is serving in the background
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// HTTP API serving stats, MJPEG feeds and push notifications
pub struct ApiServer {
    pub(crate) config: Arc<ParkwatchConfig>,
    pub(crate) state: ServerState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(state: ServerState) -> Self {
        Self {
            config: Arc::clone(&state.config),
            state,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.ip, self.config.server.port)
    }

    /// Bind the listener and serve until `token` is cancelled
    pub async fn start(&self, token: CancellationToken) -> Result<RunningServer> {
        let addr = self.address();

        info!("Starting parking API server on {}", addr);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| StreamError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        let local_addr = listener.local_addr()?;
        let app = router(self.state.clone());

        info!("Parking API listening on http://{}", local_addr);
        for endpoint in [
            "/health",
            "/slot_stats",
            "/system_metrics",
            "/video_feed_1",
            "/video_feed_2",
            "/ws",
        ] {
            info!("  GET http://{}{}", local_addr, endpoint);
        }

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;

            match result {
                Ok(()) => info!("Parking API server stopped"),
                Err(e) => error!("Parking API server error: {}", e),
            }
        });

        Ok(RunningServer { local_addr, handle })
    }
}

/// API server builder for configuration
pub struct ApiServerBuilder {
    config: Option<Arc<ParkwatchConfig>>,
    store: Option<Arc<StatsStore>>,
    bus: Option<Arc<NotificationBus>>,
    adapter: Option<SourceAdapter>,
    detector: Option<Arc<dyn Detector>>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            bus: None,
            adapter: None,
            detector: None,
        }
    }

    pub fn config(mut self, config: Arc<ParkwatchConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn store(mut self, store: Arc<StatsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn bus(mut self, bus: Arc<NotificationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn adapter(mut self, adapter: SourceAdapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Build the API server
    pub fn build(self) -> Result<ApiServer> {
        let config = self.config.ok_or_else(|| missing("Configuration"))?;
        let store = self.store.ok_or_else(|| missing("Stats store"))?;
        let bus = self.bus.ok_or_else(|| missing("Notification bus"))?;
        let adapter = self.adapter.ok_or_else(|| missing("Source adapter"))?;
        let detector = self.detector.ok_or_else(|| missing("Detector"))?;

        Ok(ApiServer::new(ServerState::new(
            config, store, bus, adapter, detector,
        )))
    }
}

fn missing(what: &str) -> ParkwatchError {
    ParkwatchError::Stream(StreamError::StartupFailed {
        details: format!("{} is required", what),
    })
}

impl Default for ApiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
