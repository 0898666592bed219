//! Frame rendering for the MJPEG feeds.
//!
//! A [`StreamRenderer`] owns one decoding handle and produces multipart
//! chunks on demand: either annotated frames from a playable feed, looped
//! forever, or a repeated "signal lost" card when the feed is unusable.

mod encode;
mod overlay;
mod placeholder;
#[cfg(test)]
mod tests;

use crate::config::ParkwatchConfig;
use crate::detector::Detector;
use crate::error::Result;
use crate::source::{SourceAdapter, VideoSource};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use encode::{encode_jpeg, multipart_part, BOUNDARY};
pub use overlay::{draw_corner_box, draw_detections, FREE_COLOR, OCCUPIED_COLOR};
pub use placeholder::render_placeholder;

/// Consecutive failed reads tolerated before a feed degrades to the placeholder
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 25;

/// Rendering parameters shared by every stream
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub jpeg_quality: u8,
    pub placeholder_message: String,
    pub placeholder_font_path: String,
}

impl From<&ParkwatchConfig> for RenderSettings {
    fn from(config: &ParkwatchConfig) -> Self {
        Self {
            frame_width: config.video.frame_width,
            frame_height: config.video.frame_height,
            jpeg_quality: config.stream.jpeg_quality,
            placeholder_message: config.stream.placeholder_message.clone(),
            placeholder_font_path: config.stream.placeholder_font_path.clone(),
        }
    }
}

/// What a chunk carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Placeholder,
    Frame { index: u64, detections: usize },
}

/// One complete multipart part ready to write to the client
#[derive(Debug, Clone)]
pub struct RenderedChunk {
    pub kind: ChunkKind,
    pub data: Bytes,
}

impl RenderedChunk {
    pub fn is_placeholder(&self) -> bool {
        self.kind == ChunkKind::Placeholder
    }
}

enum Mode {
    Live(Box<dyn VideoSource>),
    Placeholder,
}

/// Per-connection producer of MJPEG chunks
pub struct StreamRenderer {
    path: PathBuf,
    mode: Mode,
    detector: Arc<dyn Detector>,
    settings: RenderSettings,
    placeholder: Bytes,
    read_failures: u32,
    frames_rendered: u64,
    frames_dropped: u64,
}

impl StreamRenderer {
    /// Validate and open `path`; unplayable feeds start in placeholder mode
    pub fn open(
        path: &Path,
        adapter: &SourceAdapter,
        detector: Arc<dyn Detector>,
        settings: RenderSettings,
    ) -> Result<Self> {
        let placeholder = render_placeholder(
            settings.frame_width,
            settings.frame_height,
            &settings.placeholder_message,
            &settings.placeholder_font_path,
        );
        let placeholder = multipart_part(&encode_jpeg(&placeholder, settings.jpeg_quality)?);

        let mode = match adapter.open(path) {
            Ok(source) => {
                info!("Streaming {} ({} frames)", path.display(), source.frame_count());
                Mode::Live(source)
            }
            Err(e) => {
                warn!("{}; streaming placeholder instead", e);
                Mode::Placeholder
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            detector,
            settings,
            placeholder,
            read_failures: 0,
            frames_rendered: 0,
            frames_dropped: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.mode, Mode::Placeholder)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Advance by at most one frame.
    ///
    /// Returns `None` when the frame was consumed without producing a chunk
    /// (end of stream, failed read, detector or encoder failure). Callers
    /// poll again; blocking work is bounded to a single frame per call.
    pub fn poll_chunk(&mut self) -> Option<RenderedChunk> {
        let read = match &mut self.mode {
            Mode::Live(source) => source.read_frame(),
            Mode::Placeholder => return Some(self.placeholder_chunk()),
        };

        let frame = match read {
            Ok(Some(frame)) => {
                self.read_failures = 0;
                frame
            }
            Ok(None) => {
                debug!("{} reached end of stream, looping", self.path.display());
                self.rewind();
                return None;
            }
            Err(e) => {
                warn!("Failed to read frame from {}: {}", self.path.display(), e);
                self.rewind();
                return None;
            }
        };

        let mut frame = frame.resized(self.settings.frame_width, self.settings.frame_height);

        let detections = match self.detector.detect(&frame.image) {
            Ok(detections) => detections,
            Err(e) => {
                error!("Detection failed on {} frame {}: {}", self.path.display(), frame.index, e);
                self.frames_dropped += 1;
                return None;
            }
        };

        draw_detections(&mut frame.image, &detections);

        let jpeg = match encode_jpeg(&frame.image, self.settings.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!("Skipping frame {} of {}: {}", frame.index, self.path.display(), e);
                self.frames_dropped += 1;
                return None;
            }
        };

        self.frames_rendered += 1;

        Some(RenderedChunk {
            kind: ChunkKind::Frame {
                index: frame.index,
                detections: detections.len(),
            },
            data: multipart_part(&jpeg),
        })
    }

    fn placeholder_chunk(&self) -> RenderedChunk {
        RenderedChunk {
            kind: ChunkKind::Placeholder,
            data: self.placeholder.clone(),
        }
    }

    /// Seek back to the first frame; a feed that keeps failing is abandoned
    fn rewind(&mut self) {
        self.read_failures += 1;
        if self.read_failures > MAX_CONSECUTIVE_READ_FAILURES {
            error!(
                "{} failed {} times in a row, switching to placeholder",
                self.path.display(),
                self.read_failures - 1
            );
            self.mode = Mode::Placeholder;
            return;
        }

        if let Mode::Live(source) = &mut self.mode {
            if let Err(e) = source.seek(0) {
                error!("Failed to rewind {}: {}", self.path.display(), e);
                self.mode = Mode::Placeholder;
            }
        }
    }
}

impl Iterator for StreamRenderer {
    type Item = RenderedChunk;

    /// Never ends; skipped frames are retried internally
    fn next(&mut self) -> Option<RenderedChunk> {
        loop {
            if let Some(chunk) = self.poll_chunk() {
                return Some(chunk);
            }
        }
    }
}
