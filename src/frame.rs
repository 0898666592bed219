use image::imageops::{self, FilterType};
use image::RgbImage;

/// A decoded video frame together with its position in the source
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based frame index within the source
    pub index: u64,
    /// Packed RGB pixels
    pub image: RgbImage,
}

impl Frame {
    /// Create a new frame
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Build a frame from a packed RGB buffer whose rows may carry padding
    pub fn from_strided_rgb(
        index: u64,
        width: u32,
        height: u32,
        stride: usize,
        data: &[u8],
    ) -> Option<Self> {
        let row_bytes = width as usize * 3;
        if stride < row_bytes || data.len() < stride * (height as usize).saturating_sub(1) + row_bytes
        {
            return None;
        }

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        RgbImage::from_raw(width, height, pixels).map(|image| Self::new(index, image))
    }

    /// Resize to the detection size, keeping the index
    pub fn resized(self, width: u32, height: u32) -> Self {
        if self.image.dimensions() == (width, height) {
            return self;
        }

        Self {
            index: self.index,
            image: imageops::resize(&self.image, width, height, FilterType::Triangle),
        }
    }
}
