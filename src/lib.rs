pub mod app;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod notify;
pub mod render;
pub mod sampler;
pub mod server;
pub mod source;
pub mod stats;

pub use app::{ComponentState, ParkwatchOrchestrator, ShutdownReason};
pub use config::{Feed, ParkwatchConfig};
pub use detector::{Detection, Detector, MockDetector, SlotClass};
pub use error::{ParkwatchError, Result};
pub use frame::Frame;
pub use notify::{NotificationBus, NotificationSink, PushEvent};
pub use render::{RenderSettings, RenderedChunk, StreamRenderer};
pub use sampler::{CycleOutcome, StatsSampler};
pub use server::{ApiServer, ApiServerBuilder};
pub use source::{SourceAdapter, SyntheticBackend, VideoBackend, VideoSource};
pub use stats::{OccupancySnapshot, StatsStore, SystemMetrics};
