use super::postprocess::{decode_predictions, DecodeParams, Letterbox, LETTERBOX_FILL};
use super::{Detection, Detector};
use crate::config::ModelConfig;
use crate::error::DetectorError;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::PathBuf;
use tracing::{debug, info};

/// YOLOv8 slot model served through ONNX Runtime
pub struct OnnxDetector {
    // ort needs `&mut Session` to run, so calls from different feeds serialize here
    session: Mutex<Session>,
    path: PathBuf,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl OnnxDetector {
    /// Load the model described by `config`
    pub fn load(config: &ModelConfig) -> Result<Self, DetectorError> {
        let path = PathBuf::from(&config.path);
        let load_error = |details: String| DetectorError::ModelLoad {
            path: path.clone(),
            details,
        };

        info!("Loading slot detection model from {}", path.display());

        let session = Session::builder()
            .map_err(|e| load_error(format!("failed to create session builder: {}", e)))?
            .commit_from_file(&path)
            .map_err(|e| load_error(e.to_string()))?;

        info!("Slot detection model loaded");

        Ok(Self {
            session: Mutex::new(session),
            path,
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    /// Letterbox into the square input and build the NCHW tensor
    fn preprocess(
        &self,
        image: &RgbImage,
    ) -> Result<(ort::value::DynValue, Letterbox), DetectorError> {
        let size = self.input_size;
        let letterbox = Letterbox::fit(image.dimensions(), size);

        let (inner_w, inner_h) = letterbox.inner;
        let scaled = imageops::resize(image, inner_w, inner_h, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
        let (pad_x, pad_y) = letterbox.pad;
        imageops::replace(&mut canvas, &scaled, pad_x as i64, pad_y as i64);

        // Normalised to [0, 1]
        let plane = (size * size) as usize;
        let mut tensor_data = vec![0f32; 3 * plane];
        for (idx, pixel) in canvas.as_raw().chunks_exact(3).enumerate() {
            tensor_data[idx] = pixel[0] as f32 / 255.0;
            tensor_data[plane + idx] = pixel[1] as f32 / 255.0;
            tensor_data[2 * plane + idx] = pixel[2] as f32 / 255.0;
        }

        let shape = [1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, tensor_data.into_boxed_slice()))
            .map(|tensor| (tensor.into_dyn(), letterbox))
            .map_err(|e| DetectorError::Inference {
                details: format!("failed to create input tensor: {}", e),
            })
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        let (input, letterbox) = self.preprocess(image)?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| DetectorError::Inference {
                details: e.to_string(),
            })?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference {
                details: format!("failed to extract output tensor: {}", e),
            })?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let params = DecodeParams {
            letterbox,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
        };
        let detections = decode_predictions(&dims, data, &params);

        debug!(
            "{} produced {} detections for {}x{} frame",
            self.path.display(),
            detections.len(),
            image.width(),
            image.height()
        );

        Ok(detections)
    }
}
