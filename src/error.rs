use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParkwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Video source error: {0}")]
    Source(#[from] SourceError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Reasons a video path is unusable or a read failed
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("video file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("video file {path} is too small ({size} bytes, minimum {minimum})")]
    TooSmall {
        path: PathBuf,
        size: u64,
        minimum: u64,
    },

    #[error("video file {path} reports no frames")]
    NoFrames { path: PathBuf },

    #[error("failed to open {path}: {details}")]
    Open { path: PathBuf, details: String },

    #[error("failed to decode frame: {details}")]
    Decode { details: String },

    #[error("failed to seek to frame {index}: {details}")]
    Seek { index: u64, details: String },
}

impl SourceError {
    /// True for the conditions that make a path Invalid rather than a failed read
    pub fn is_invalid_source(&self) -> bool {
        matches!(
            self,
            SourceError::NotFound { .. }
                | SourceError::TooSmall { .. }
                | SourceError::NoFrames { .. }
                | SourceError::Open { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to load model {path}: {details}")]
    ModelLoad { path: PathBuf, details: String },

    #[error("inference failed: {details}")]
    Inference { details: String },

    #[error("detector backend unavailable: {details}")]
    Unavailable { details: String },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encoding failed: {details}")]
    Jpeg { details: String },
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server startup failed: {details}")]
    StartupFailed { details: String },
}

impl ParkwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParkwatchError>;
