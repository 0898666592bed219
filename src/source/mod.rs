mod adapter;
#[cfg(all(feature = "video", target_os = "linux"))]
mod gst;
mod synthetic;

use crate::error::SourceError;
use crate::frame::Frame;
use std::path::Path;
use std::sync::Arc;

pub use adapter::{seek_random, SourceAdapter};
#[cfg(all(feature = "video", target_os = "linux"))]
pub use gst::GstBackend;
pub use synthetic::SyntheticBackend;

/// An open, exclusively owned video decoding handle
pub trait VideoSource: Send {
    /// Number of frames the source reports
    fn frame_count(&self) -> u64;

    /// Read the next frame, `Ok(None)` at end of stream
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Position the source so the next read returns frame `index`
    fn seek(&mut self, index: u64) -> Result<(), SourceError>;
}

/// Opens video handles by path
pub trait VideoBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, SourceError>;
}

/// Backend used when no decoder is compiled in; every path is unplayable
pub struct NullBackend;

impl VideoBackend for NullBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, SourceError> {
        Err(SourceError::Open {
            path: path.to_path_buf(),
            details: "no video decoding backend compiled in".to_string(),
        })
    }
}

/// Pick the best decoding backend available in this build
pub fn default_backend() -> Arc<dyn VideoBackend> {
    #[cfg(all(feature = "video", target_os = "linux"))]
    {
        match GstBackend::new() {
            Ok(backend) => return Arc::new(backend),
            Err(e) => tracing::error!("GStreamer unavailable, all feeds will be placeholders: {}", e),
        }
    }

    #[cfg(not(all(feature = "video", target_os = "linux")))]
    tracing::warn!("Built without the video feature, all feeds will be placeholders");

    Arc::new(NullBackend)
}
