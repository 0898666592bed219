use crate::error::EncodeError;
use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};

/// Multipart boundary token shared with the `Content-Type` header
pub const BOUNDARY: &str = "frame";

/// Encode an RGB image as a baseline JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut output = Vec::with_capacity((image.width() * image.height()) as usize / 8);
    JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100))
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| EncodeError::Jpeg {
            details: e.to_string(),
        })?;
    Ok(output)
}

/// Wrap one JPEG in a `multipart/x-mixed-replace` part
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
