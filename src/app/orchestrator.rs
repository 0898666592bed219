use super::types::{ComponentState, ShutdownReason};
use crate::config::ParkwatchConfig;
use crate::detector::{load_detector, Detector};
use crate::error::Result;
use crate::notify::{NotificationBus, NotificationSink};
use crate::sampler::StatsSampler;
use crate::server::{ApiServer, ServerState};
use crate::source::{default_backend, SourceAdapter, VideoBackend};
use crate::stats::StatsStore;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator wiring the sampler and the HTTP API
pub struct ParkwatchOrchestrator {
    pub(super) config: Arc<ParkwatchConfig>,
    pub(super) store: Arc<StatsStore>,
    pub(super) bus: Arc<NotificationBus>,

    // Components
    pub(super) sampler: Option<StatsSampler>,
    pub(super) server: Option<ApiServer>,
    pub(super) sampler_handle: Option<JoinHandle<()>>,
    pub(super) server_handle: Option<JoinHandle<()>>,
    pub(super) local_addr: Option<SocketAddr>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl ParkwatchOrchestrator {
    /// Create a new orchestrator; fails if the detection model cannot be loaded
    pub async fn new(config: ParkwatchConfig) -> Result<Self> {
        let detector = load_detector(&config.model)?;
        let backend = default_backend();

        Ok(Self::with_components(config, backend, detector))
    }

    /// Create an orchestrator around an explicit decoding backend and detector
    pub fn with_components(
        config: ParkwatchConfig,
        backend: Arc<dyn VideoBackend>,
        detector: Arc<dyn Detector>,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(StatsStore::default());
        let bus = Arc::new(NotificationBus::default());
        let adapter = SourceAdapter::new(backend, config.video.min_file_size);
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!("Using {} video backend", adapter.backend_name());

        let sampler = StatsSampler::new(
            &config,
            adapter.clone(),
            Arc::clone(&detector),
            Arc::clone(&store),
            Arc::clone(&bus) as Arc<dyn NotificationSink>,
        );

        let server = ApiServer::new(ServerState::new(
            Arc::clone(&config),
            Arc::clone(&store),
            Arc::clone(&bus),
            adapter,
            detector,
        ));

        Self {
            config,
            store,
            bus,
            sampler: Some(sampler),
            server: Some(server),
            sampler_handle: None,
            server_handle: None,
            local_addr: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ParkwatchConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<StatsStore> {
        Arc::clone(&self.store)
    }

    pub fn bus(&self) -> Arc<NotificationBus> {
        Arc::clone(&self.bus)
    }

    /// Address the API actually bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}
