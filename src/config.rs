use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ParkwatchConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub video: VideoConfig,
    pub sampler: SamplerConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Origin allowed to call the API ("*" allows any)
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Path to the slot detection model
    #[serde(default = "default_model_path")]
    pub path: String,

    /// Detections below this confidence are discarded
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Overlap above which weaker boxes are suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Square input edge expected by the model
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VideoConfig {
    /// Primary feed, also sampled for statistics
    #[serde(default = "default_feed_1")]
    pub feed_1: String,

    /// Secondary feed
    #[serde(default = "default_feed_2")]
    pub feed_2: String,

    /// Files smaller than this are stubs, not video payloads
    #[serde(default = "default_min_file_size")]
    pub min_file_size: u64,

    /// Width every frame is resized to before detection
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    /// Height every frame is resized to before detection
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SamplerConfig {
    /// Seconds between sampler cycles
    #[serde(default = "default_sampler_interval")]
    pub interval_seconds: u64,

    /// Revenue credited per occupied slot
    #[serde(default = "default_revenue_per_vehicle")]
    pub revenue_per_vehicle: f64,

    /// Fraction of nominal revenue actually collected
    #[serde(default = "default_revenue_factor")]
    pub revenue_factor: f64,

    /// Upper bound of the randomized violation count
    #[serde(default = "default_max_violations")]
    pub max_violations: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// JPEG quality for streamed frames (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Rate at which the placeholder image is repeated
    #[serde(default = "default_placeholder_fps")]
    pub placeholder_fps: u32,

    /// Label drawn on the placeholder image
    #[serde(default = "default_placeholder_message")]
    pub placeholder_message: String,

    /// TrueType font used for placeholder labels
    #[serde(default = "default_placeholder_font_path")]
    pub placeholder_font_path: String,

    /// Frames between throughput log lines
    #[serde(default = "default_stats_log_interval")]
    pub stats_log_interval: u64,
}

/// Bare variables honoured for existing deployments, applied over everything else
const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("MODEL_PATH", "model.path"),
    ("VIDEO_PATH_1", "video.feed_1"),
    ("VIDEO_PATH_2", "video.feed_2"),
    ("PORT", "server.port"),
    ("FRONTEND_URL", "server.allowed_origin"),
];

impl ParkwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("parkwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let mut builder = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("server.allowed_origin", default_allowed_origin())?
            .set_default("model.path", default_model_path())?
            .set_default(
                "model.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default("model.iou_threshold", default_iou_threshold() as f64)?
            .set_default("model.input_size", default_input_size())?
            .set_default("video.feed_1", default_feed_1())?
            .set_default("video.feed_2", default_feed_2())?
            .set_default("video.min_file_size", default_min_file_size() as i64)?
            .set_default("video.frame_width", default_frame_width())?
            .set_default("video.frame_height", default_frame_height())?
            .set_default("sampler.interval_seconds", default_sampler_interval() as i64)?
            .set_default("sampler.revenue_per_vehicle", default_revenue_per_vehicle())?
            .set_default("sampler.revenue_factor", default_revenue_factor())?
            .set_default("sampler.max_violations", default_max_violations())?
            .set_default("stream.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default("stream.placeholder_fps", default_placeholder_fps())?
            .set_default("stream.placeholder_message", default_placeholder_message())?
            .set_default(
                "stream.placeholder_font_path",
                default_placeholder_font_path(),
            )?
            .set_default(
                "stream.stats_log_interval",
                default_stats_log_interval() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with PARKWATCH_ prefix, e.g. PARKWATCH_SERVER__PORT
            .add_source(
                Environment::with_prefix("PARKWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (variable, key) in LEGACY_OVERRIDES {
            if let Ok(value) = std::env::var(variable) {
                debug!("Applying legacy override {} -> {}", variable, key);
                builder = builder.set_override(*key, value)?;
            }
        }

        let config: ParkwatchConfig = builder.build()?.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if !(self.model.confidence_threshold > 0.0 && self.model.confidence_threshold <= 1.0) {
            return Err(ConfigError::Message(
                "Model confidence_threshold must be in (0, 1]".to_string(),
            ));
        }

        if !(self.model.iou_threshold > 0.0 && self.model.iou_threshold <= 1.0) {
            return Err(ConfigError::Message(
                "Model iou_threshold must be in (0, 1]".to_string(),
            ));
        }

        if self.model.input_size == 0 {
            return Err(ConfigError::Message(
                "Model input_size must be greater than 0".to_string(),
            ));
        }

        if self.video.frame_width == 0 || self.video.frame_height == 0 {
            return Err(ConfigError::Message(
                "Video frame dimensions must be greater than 0".to_string(),
            ));
        }

        if self.sampler.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Sampler interval_seconds must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(ConfigError::Message(
                "Stream jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.stream.placeholder_fps == 0 {
            return Err(ConfigError::Message(
                "Stream placeholder_fps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as a TOML document
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Frame size every source frame is resized to
    pub fn frame_size(&self) -> (u32, u32) {
        (self.video.frame_width, self.video.frame_height)
    }

    pub fn feed_path(&self, feed: Feed) -> PathBuf {
        match feed {
            Feed::Primary => PathBuf::from(&self.video.feed_1),
            Feed::Secondary => PathBuf::from(&self.video.feed_2),
        }
    }
}

/// The two camera feeds served by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Primary,
    Secondary,
}

impl Default for ParkwatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
                allowed_origin: default_allowed_origin(),
            },
            model: ModelConfig {
                path: default_model_path(),
                confidence_threshold: default_confidence_threshold(),
                iou_threshold: default_iou_threshold(),
                input_size: default_input_size(),
            },
            video: VideoConfig {
                feed_1: default_feed_1(),
                feed_2: default_feed_2(),
                min_file_size: default_min_file_size(),
                frame_width: default_frame_width(),
                frame_height: default_frame_height(),
            },
            sampler: SamplerConfig {
                interval_seconds: default_sampler_interval(),
                revenue_per_vehicle: default_revenue_per_vehicle(),
                revenue_factor: default_revenue_factor(),
                max_violations: default_max_violations(),
            },
            stream: StreamConfig {
                jpeg_quality: default_jpeg_quality(),
                placeholder_fps: default_placeholder_fps(),
                placeholder_message: default_placeholder_message(),
                placeholder_font_path: default_placeholder_font_path(),
                stats_log_interval: default_stats_log_interval(),
            },
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    5000
}
fn default_allowed_origin() -> String {
    "*".to_string()
}

fn default_model_path() -> String {
    "final_model.onnx".to_string()
}
fn default_confidence_threshold() -> f32 {
    0.4
}
fn default_iou_threshold() -> f32 {
    0.45
}
fn default_input_size() -> u32 {
    640
}

fn default_feed_1() -> String {
    "Parking_Lot_CCTV_1.mp4".to_string()
}
fn default_feed_2() -> String {
    "Parking_Lot_CCTV_2.1.mp4".to_string()
}
fn default_min_file_size() -> u64 {
    10_000
} // LFS pointer files are ~134 bytes
fn default_frame_width() -> u32 {
    640
}
fn default_frame_height() -> u32 {
    480
}

fn default_sampler_interval() -> u64 {
    10
}
fn default_revenue_per_vehicle() -> f64 {
    150.0
}
fn default_revenue_factor() -> f64 {
    0.8
}
fn default_max_violations() -> u32 {
    5
}

fn default_jpeg_quality() -> u8 {
    80
}
fn default_placeholder_fps() -> u32 {
    2
}
fn default_placeholder_message() -> String {
    "Signal Lost – Video Unavailable".to_string()
}
fn default_placeholder_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_stats_log_interval() -> u64 {
    100
}
