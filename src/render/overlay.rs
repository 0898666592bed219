use crate::detector::{Detection, SlotClass};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

pub const FREE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OCCUPIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const CORNER_LENGTH: u32 = 30;
const CORNER_THICKNESS: u32 = 2;

pub fn color_for(class: SlotClass) -> Rgb<u8> {
    match class {
        SlotClass::FreeSlot => FREE_COLOR,
        SlotClass::OccupiedSlot => OCCUPIED_COLOR,
    }
}

/// Draw corner brackets around every detection, in place
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
        draw_corner_box(
            image,
            detection.bbox.x1,
            detection.bbox.y1,
            detection.bbox.x2,
            detection.bbox.y2,
            color_for(detection.class),
        );
    }
}

/// Draw only the four corners of a rectangle; arms are capped at half the side
pub fn draw_corner_box(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>) {
    let width = (x2 - x1).max(0) as u32;
    let height = (y2 - y1).max(0) as u32;
    if width == 0 || height == 0 {
        return;
    }

    let arm = CORNER_LENGTH.min(width / 2).min(height / 2).max(1);
    let thick = CORNER_THICKNESS.min(width).min(height).max(1);
    let (arm_i, thick_i) = (arm as i32, thick as i32);

    let segments = [
        // top-left
        Rect::at(x1, y1).of_size(arm, thick),
        Rect::at(x1, y1).of_size(thick, arm),
        // top-right
        Rect::at(x2 - arm_i, y1).of_size(arm, thick),
        Rect::at(x2 - thick_i, y1).of_size(thick, arm),
        // bottom-left
        Rect::at(x1, y2 - thick_i).of_size(arm, thick),
        Rect::at(x1, y2 - arm_i).of_size(thick, arm),
        // bottom-right
        Rect::at(x2 - arm_i, y2 - thick_i).of_size(arm, thick),
        Rect::at(x2 - thick_i, y2 - arm_i).of_size(thick, arm),
    ];

    for segment in segments {
        draw_filled_rect_mut(image, segment, color);
    }
}
