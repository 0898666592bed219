use super::{VideoBackend, VideoSource};
use crate::error::{ParkwatchError, Result, SourceError};
use crate::frame::Frame;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, Pipeline, SeekFlags, State};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

const PIPELINE_DESC: &str = "filesrc name=src ! decodebin ! videoconvert ! \
     video/x-raw,format=RGB ! \
     appsink name=sink sync=false max-buffers=2 drop=false enable-last-sample=false";

const PREROLL_TIMEOUT: ClockTime = ClockTime::from_seconds(5);

/// GStreamer-based decoder for video files
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> Result<Self> {
        gstreamer::init().map_err(|e| {
            ParkwatchError::component(
                "video_source",
                format!("Failed to initialize GStreamer: {}", e),
            )
        })?;

        info!("GStreamer video backend initialized");
        Ok(Self)
    }
}

impl VideoBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&self, path: &Path) -> std::result::Result<Box<dyn VideoSource>, SourceError> {
        GstSource::open(path).map(|source| Box::new(source) as Box<dyn VideoSource>)
    }
}

struct GstSource {
    path: PathBuf,
    pipeline: Pipeline,
    appsink: AppSink,
    frame_count: u64,
    fps: (u64, u64),
    next_index: u64,
}

impl GstSource {
    fn open(path: &Path) -> std::result::Result<Self, SourceError> {
        let open_error = |details: String| SourceError::Open {
            path: path.to_path_buf(),
            details,
        };

        let pipeline = gstreamer::parse::launch(PIPELINE_DESC)
            .map_err(|e| open_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_error("Failed to downcast to Pipeline".to_string()))?;

        let filesrc = pipeline
            .by_name("src")
            .ok_or_else(|| open_error("Pipeline has no filesrc".to_string()))?;
        filesrc.set_property("location", path.to_string_lossy().into_owned());

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_error("Pipeline has no appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| open_error("Failed to downcast to AppSink".to_string()))?;

        // Preroll so caps and duration are known before any frame is pulled
        if let Err(e) = pipeline.set_state(State::Paused) {
            let _ = pipeline.set_state(State::Null);
            return Err(open_error(format!("Failed to preroll: {}", e)));
        }
        let (preroll, _, _) = pipeline.state(PREROLL_TIMEOUT);
        if let Err(e) = preroll {
            let _ = pipeline.set_state(State::Null);
            return Err(open_error(format!("Preroll did not complete: {}", e)));
        }

        let fps = appsink
            .static_pad("sink")
            .and_then(|pad| pad.current_caps())
            .and_then(|caps| VideoInfo::from_caps(&caps).ok())
            .map(|info| {
                let fps = info.fps();
                (fps.numer().max(0) as u64, fps.denom().max(1) as u64)
            })
            .unwrap_or((0, 1));

        let duration = pipeline.query_duration::<ClockTime>();
        let mut frame_count = match duration {
            Some(duration) if fps.0 > 0 => {
                (duration.nseconds() as u128 * fps.0 as u128 / (fps.1 as u128 * 1_000_000_000))
                    as u64
            }
            _ => 0,
        };

        if frame_count == 0 && appsink.try_pull_preroll(PREROLL_TIMEOUT).is_some() {
            // Stream without a usable duration; it decodes, so treat it as a single frame
            warn!(
                "{} reports no duration, treating it as a single-frame source",
                path.display()
            );
            frame_count = 1;
        }

        if let Err(e) = pipeline.set_state(State::Playing) {
            let _ = pipeline.set_state(State::Null);
            return Err(open_error(format!("Failed to start playback: {}", e)));
        }

        debug!(
            "GStreamer source {} opened ({} frames @ {}/{} fps)",
            path.display(),
            frame_count,
            fps.0,
            fps.1
        );

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            appsink,
            frame_count,
            fps,
            next_index: 0,
        })
    }

    fn index_at(&self, pts: Option<ClockTime>) -> u64 {
        match pts {
            Some(pts) if self.fps.0 > 0 => {
                let numerator = pts.nseconds() as u128 * self.fps.0 as u128;
                let denominator = self.fps.1 as u128 * 1_000_000_000;
                ((numerator + denominator / 2) / denominator) as u64
            }
            _ => self.next_index,
        }
    }

    fn position_of(&self, index: u64) -> ClockTime {
        if self.fps.0 == 0 {
            return ClockTime::ZERO;
        }
        let nanos = index as u128 * self.fps.1 as u128 * 1_000_000_000 / self.fps.0 as u128;
        ClockTime::from_nseconds(nanos as u64)
    }

    fn sample_to_frame(
        &mut self,
        sample: &gstreamer::Sample,
    ) -> std::result::Result<Frame, SourceError> {
        let caps = sample.caps().ok_or_else(|| SourceError::Decode {
            details: "No caps in sample".to_string(),
        })?;
        let info = VideoInfo::from_caps(caps).map_err(|e| SourceError::Decode {
            details: format!("Failed to get video info: {}", e),
        })?;
        let buffer = sample.buffer().ok_or_else(|| SourceError::Decode {
            details: "No buffer in sample".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| SourceError::Decode {
            details: format!("Failed to map buffer: {}", e),
        })?;

        let index = self.index_at(buffer.pts());
        self.next_index = index + 1;

        let stride = info.stride()[0].max(0) as usize;
        let frame = Frame::from_strided_rgb(index, info.width(), info.height(), stride, map.as_slice())
            .ok_or_else(|| SourceError::Decode {
                details: format!(
                    "Buffer of {} bytes does not hold a {}x{} RGB frame",
                    map.len(),
                    info.width(),
                    info.height()
                ),
            })?;

        trace!(
            "Decoded frame {} from {} ({}x{})",
            index,
            self.path.display(),
            info.width(),
            info.height()
        );

        Ok(frame)
    }
}

impl VideoSource for GstSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn read_frame(&mut self) -> std::result::Result<Option<Frame>, SourceError> {
        if self.appsink.is_eos() {
            return Ok(None);
        }

        match self.appsink.pull_sample() {
            Ok(sample) => self.sample_to_frame(&sample).map(Some),
            Err(_) if self.appsink.is_eos() => Ok(None),
            Err(e) => Err(SourceError::Decode {
                details: e.to_string(),
            }),
        }
    }

    fn seek(&mut self, index: u64) -> std::result::Result<(), SourceError> {
        let position = self.position_of(index);
        self.pipeline
            .seek_simple(SeekFlags::FLUSH | SeekFlags::ACCURATE, position)
            .map_err(|e| SourceError::Seek {
                index,
                details: e.to_string(),
            })?;

        self.next_index = index;
        Ok(())
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(State::Null);
        trace!("GStreamer source {} closed", self.path.display());
    }
}
