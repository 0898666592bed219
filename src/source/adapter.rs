use super::{VideoBackend, VideoSource};
use crate::error::SourceError;
use crate::frame::Frame;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Validates video paths and hands out decoding handles
#[derive(Clone)]
pub struct SourceAdapter {
    backend: Arc<dyn VideoBackend>,
    min_file_size: u64,
}

impl SourceAdapter {
    pub fn new(backend: Arc<dyn VideoBackend>, min_file_size: u64) -> Self {
        Self {
            backend,
            min_file_size,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Open `path`, rejecting missing, stub-sized and frameless files
    pub fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, SourceError> {
        let size = match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                return Err(SourceError::NotFound {
                    path: path.to_path_buf(),
                })
            }
        };

        if size < self.min_file_size {
            return Err(SourceError::TooSmall {
                path: path.to_path_buf(),
                size,
                minimum: self.min_file_size,
            });
        }

        let source = self.backend.open(path)?;
        if source.frame_count() == 0 {
            return Err(SourceError::NoFrames {
                path: path.to_path_buf(),
            });
        }

        debug!(
            "Opened {} via {} backend ({} frames)",
            path.display(),
            self.backend.name(),
            source.frame_count()
        );

        Ok(source)
    }

    /// Probe `path`; the handle is released before returning
    pub fn is_valid(&self, path: &Path) -> bool {
        match self.open(path) {
            Ok(_) => true,
            Err(e) => {
                trace!("{} is not a playable video: {}", path.display(), e);
                false
            }
        }
    }

    /// Open `path`, read one uniformly chosen frame and close the handle
    pub fn sample_random<R: Rng + ?Sized>(
        &self,
        path: &Path,
        rng: &mut R,
    ) -> Result<Option<Frame>, SourceError> {
        let mut source = self.open(path)?;
        seek_random(source.as_mut(), rng)
    }
}

/// Jump to a uniformly chosen frame and read it; single-frame sources are read in place
pub fn seek_random<R: Rng + ?Sized>(
    source: &mut dyn VideoSource,
    rng: &mut R,
) -> Result<Option<Frame>, SourceError> {
    let total = source.frame_count();
    if total > 1 {
        let index = rng.gen_range(0..total);
        trace!("Seeking to random frame {} of {}", index, total);
        source.seek(index)?;
    }
    source.read_frame()
}
