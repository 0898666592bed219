//! Slot detection: the model-facing contract shared by the sampler and the
//! stream renderer, plus the concrete backends.
//!
//! Detectors are stateless between calls and shared as `Arc<dyn Detector>`,
//! so one loaded model serves every feed and the sampler at once.

mod mock;
#[cfg(feature = "onnx")]
mod onnx;
mod postprocess;

use crate::config::ModelConfig;
use crate::error::DetectorError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use mock::MockDetector;
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;
pub use postprocess::{decode_predictions, non_max_suppression, DecodeParams, Letterbox};

/// Class labels in model output order
pub const CLASS_LABELS: [SlotClass; 2] = [SlotClass::OccupiedSlot, SlotClass::FreeSlot];

/// Slot classification produced by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotClass {
    OccupiedSlot,
    FreeSlot,
}

impl SlotClass {
    /// Map a model class index to a label, `None` outside the label table
    pub fn from_class_index(index: usize) -> Option<Self> {
        CLASS_LABELS.get(index).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            SlotClass::OccupiedSlot => "occupied_slot",
            SlotClass::FreeSlot => "free_slot",
        }
    }
}

/// Axis-aligned box in pixel coordinates of the detected frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: SlotClass,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(class: SlotClass, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            class,
            bbox,
            confidence,
        }
    }

    pub fn occupied(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(SlotClass::OccupiedSlot, BoundingBox::new(x1, y1, x2, y2), 1.0)
    }

    pub fn free(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(SlotClass::FreeSlot, BoundingBox::new(x1, y1, x2, y2), 1.0)
    }
}

/// Count detections per label as `(occupied, free)`
pub fn count_slots(detections: &[Detection]) -> (u32, u32) {
    detections
        .iter()
        .fold((0, 0), |(occupied, free), detection| match detection.class {
            SlotClass::OccupiedSlot => (occupied + 1, free),
            SlotClass::FreeSlot => (occupied, free + 1),
        })
}

/// Runs the slot model over one frame.
///
/// Only detections at or above the configured confidence threshold are
/// returned. Implementations keep no state between calls.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Load the detector described by `config`
pub fn load_detector(config: &ModelConfig) -> Result<Arc<dyn Detector>, DetectorError> {
    #[cfg(feature = "onnx")]
    {
        Ok(Arc::new(OnnxDetector::load(config)?))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(DetectorError::Unavailable {
            details: format!(
                "cannot load {}: built without the onnx feature",
                config.path
            ),
        })
    }
}
