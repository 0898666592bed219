use super::{Detection, Detector};
use crate::error::DetectorError;
use image::RgbImage;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock detector for testing without a model file
pub struct MockDetector {
    fixed: Result<Vec<Detection>, String>,
    scripted: Mutex<VecDeque<Result<Vec<Detection>, String>>>,
    calls: AtomicUsize,
}

impl MockDetector {
    /// Always return `detections`
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self {
            fixed: Ok(detections),
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return no detections
    pub fn empty() -> Self {
        Self::fixed(Vec::new())
    }

    /// Fail every call with `message`
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            fixed: Err(message.into()),
            scripted: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue one-shot results served before the fixed behaviour
    pub fn then(self, result: Result<Vec<Detection>, String>) -> Self {
        self.scripted.lock().push_back(result);
        self
    }

    /// Number of `detect` calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for MockDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let result = self
            .scripted
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fixed.clone());

        result.map_err(|details| DetectorError::Inference { details })
    }
}
