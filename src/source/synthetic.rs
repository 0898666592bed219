use super::{VideoBackend, VideoSource};
use crate::error::SourceError;
use crate::frame::Frame;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory backend serving generated clips, for tests and demos.
///
/// Frame `i` is a solid image whose red channel is `i % 256` and green
/// channel `i / 256 % 256`, so decoded pixels identify the frame.
#[derive(Clone, Default)]
pub struct SyntheticBackend {
    clips: HashMap<PathBuf, ClipSpec>,
    handles: Arc<HandleCounters>,
}

#[derive(Debug, Clone, Copy)]
struct ClipSpec {
    frame_count: u64,
    width: u32,
    height: u32,
}

#[derive(Default)]
struct HandleCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip of `frame_count` 640x480 frames at `path`
    pub fn with_clip<P: Into<PathBuf>>(self, path: P, frame_count: u64) -> Self {
        self.with_sized_clip(path, frame_count, 640, 480)
    }

    /// Register a clip with explicit frame dimensions
    pub fn with_sized_clip<P: Into<PathBuf>>(
        mut self,
        path: P,
        frame_count: u64,
        width: u32,
        height: u32,
    ) -> Self {
        self.clips.insert(
            path.into(),
            ClipSpec {
                frame_count,
                width,
                height,
            },
        );
        self
    }

    /// Handles opened so far
    pub fn opened(&self) -> usize {
        self.handles.opened.load(Ordering::SeqCst)
    }

    /// Handles currently alive
    pub fn open_handles(&self) -> usize {
        self.opened() - self.handles.closed.load(Ordering::SeqCst)
    }

    /// Recover the frame index encoded in a synthetic frame's pixels
    pub fn frame_marker(image: &RgbImage) -> u64 {
        let pixel = image.get_pixel(0, 0);
        pixel[0] as u64 + pixel[1] as u64 * 256
    }
}

impl VideoBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, SourceError> {
        let spec = self.clips.get(path).copied().ok_or_else(|| SourceError::Open {
            path: path.to_path_buf(),
            details: "no synthetic clip registered".to_string(),
        })?;

        self.handles.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticSource {
            spec,
            position: 0,
            handles: Arc::clone(&self.handles),
        }))
    }
}

struct SyntheticSource {
    spec: ClipSpec,
    position: u64,
    handles: Arc<HandleCounters>,
}

impl VideoSource for SyntheticSource {
    fn frame_count(&self) -> u64 {
        self.spec.frame_count
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.position >= self.spec.frame_count {
            return Ok(None);
        }

        let index = self.position;
        self.position += 1;

        let marker = Rgb([(index % 256) as u8, (index / 256 % 256) as u8, 0]);
        let image = RgbImage::from_pixel(self.spec.width, self.spec.height, marker);

        Ok(Some(Frame::new(index, image)))
    }

    fn seek(&mut self, index: u64) -> Result<(), SourceError> {
        if index >= self.spec.frame_count.max(1) {
            return Err(SourceError::Seek {
                index,
                details: format!("clip has {} frames", self.spec.frame_count),
            });
        }
        self.position = index;
        Ok(())
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.handles.closed.fetch_add(1, Ordering::SeqCst);
    }
}
