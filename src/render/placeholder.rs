use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use std::fs;
use tracing::{debug, warn};

pub const BACKGROUND: Rgb<u8> = Rgb([30, 20, 20]);
const MESSAGE_COLOR: Rgb<u8> = Rgb([80, 80, 80]);
const BRAND_COLOR: Rgb<u8> = Rgb([200, 100, 50]);
const BRAND_LABEL: &str = "Park Prabandh AI";

const MESSAGE_SCALE: f32 = 30.0;
const BRAND_SCALE: f32 = 16.0;
const MARGIN: i32 = 20;

/// Dark "signal lost" card shown in place of an unplayable feed.
///
/// Text needs a TrueType font; when `font_path` cannot be loaded the card is
/// returned blank rather than failing the stream.
pub fn render_placeholder(width: u32, height: u32, message: &str, font_path: &str) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

    let font = match load_font(font_path) {
        Some(font) => font,
        None => return image,
    };

    // Shrink the message until it fits with a margin on both sides
    let mut scale = Scale::uniform(MESSAGE_SCALE);
    let (mut text_width, mut text_height) = text_size(scale, &font, message);
    let max_width = width as i32 - 2 * MARGIN;
    if text_width > max_width && text_width > 0 {
        let factor = max_width.max(1) as f32 / text_width as f32;
        scale = Scale::uniform(MESSAGE_SCALE * factor);
        (text_width, text_height) = text_size(scale, &font, message);
    }

    let x = (width as i32 - text_width) / 2;
    let y = (height as i32 - text_height) / 2;
    draw_text_mut(&mut image, MESSAGE_COLOR, x, y, scale, &font, message);

    draw_text_mut(
        &mut image,
        BRAND_COLOR,
        x + MARGIN,
        y + text_height + MARGIN,
        Scale::uniform(BRAND_SCALE),
        &font,
        BRAND_LABEL,
    );

    image
}

fn load_font(path: &str) -> Option<Font<'static>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to read placeholder font '{}': {}", path, e);
            return None;
        }
    };

    match Font::try_from_vec(data) {
        Some(font) => {
            debug!("Loaded placeholder font {}", path);
            Some(font)
        }
        None => {
            warn!("Failed to parse placeholder font '{}'", path);
            None
        }
    }
}
