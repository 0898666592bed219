use super::{BoundingBox, Detection, SlotClass};

/// Grey used for letterbox padding by YOLO exports
pub const LETTERBOX_FILL: u8 = 114;

/// Aspect-preserving fit of a frame into the square model input.
///
/// The frame is scaled until its longer side fills the square and the
/// remainder is split evenly as padding on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub input_size: u32,
    pub frame_size: (u32, u32),
    pub scale: f32,
    /// Size of the scaled frame inside the square
    pub inner: (u32, u32),
    /// Left and top padding in model input pixels
    pub pad: (u32, u32),
}

impl Letterbox {
    pub fn fit(frame_size: (u32, u32), input_size: u32) -> Self {
        let (w, h) = (frame_size.0.max(1), frame_size.1.max(1));
        let scale = (input_size as f32 / w as f32).min(input_size as f32 / h as f32);
        let inner = (
            ((w as f32 * scale).round() as u32).clamp(1, input_size),
            ((h as f32 * scale).round() as u32).clamp(1, input_size),
        );

        Self {
            input_size,
            frame_size,
            scale,
            inner,
            pad: ((input_size - inner.0) / 2, (input_size - inner.1) / 2),
        }
    }

    /// Map a model-space point back onto the frame, clamped to its bounds
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let (frame_w, frame_h) = self.frame_size;
        (
            ((x - self.pad.0 as f32) / self.scale).clamp(0.0, frame_w as f32),
            ((y - self.pad.1 as f32) / self.scale).clamp(0.0, frame_h as f32),
        )
    }
}

/// Parameters for turning raw model output into detections
#[derive(Debug, Clone, Copy)]
pub struct DecodeParams {
    /// How the frame was placed inside the model input
    pub letterbox: Letterbox,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

/// Decode a YOLOv8-style `[1, 4 + classes, proposals]` tensor.
///
/// Rows 0..4 hold `cx, cy, w, h` in model input pixels, the remaining rows
/// hold per-class scores. Boxes are mapped back through the letterbox. A proposal whose best class is outside the label
/// table is dropped.
pub fn decode_predictions(dims: &[usize], data: &[f32], params: &DecodeParams) -> Vec<Detection> {
    let (rows, proposals) = match dims {
        [1, rows, proposals] | [rows, proposals] => (*rows, *proposals),
        _ => return Vec::new(),
    };
    if rows <= 4 || data.len() < rows * proposals {
        return Vec::new();
    }

    let num_classes = rows - 4;
    let at = |row: usize, i: usize| data[row * proposals + i];

    let mut candidates = Vec::new();

    for i in 0..proposals {
        let (best_class, best_score) = (0..num_classes)
            .map(|c| (c, at(4 + c, i)))
            .fold((0, f32::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });

        if best_score < params.confidence_threshold {
            continue;
        }
        let Some(class) = SlotClass::from_class_index(best_class) else {
            continue;
        };

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let (x1, y1) = params.letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = params.letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        let bbox = BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32);
        if bbox.is_empty() {
            continue;
        }

        candidates.push(Detection::new(class, bbox, best_score));
    }

    non_max_suppression(candidates, params.iou_threshold)
}

/// Class-aware greedy NMS, highest confidence first
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.class == candidate.class && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = ((ix2 - ix1).max(0) * (iy2 - iy1).max(0)) as f32;
    if inter == 0.0 {
        return 0.0;
    }
    let union = (a.width() * a.height() + b.width() * b.height()) as f32 - inter;
    inter / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            letterbox: Letterbox::fit((640, 480), 640),
            confidence_threshold: 0.4,
            iou_threshold: 0.45,
        }
    }

    /// Lay out proposals as `[1, 6, n]` (two classes)
    fn tensor(proposals: &[[f32; 6]]) -> (Vec<usize>, Vec<f32>) {
        let n = proposals.len();
        let mut data = vec![0.0; 6 * n];
        for (i, p) in proposals.iter().enumerate() {
            for (row, value) in p.iter().enumerate() {
                data[row * n + i] = *value;
            }
        }
        (vec![1, 6, n], data)
    }

    #[test]
    fn test_letterbox_pads_short_side() {
        let letterbox = Letterbox::fit((640, 480), 640);
        assert_eq!(letterbox.scale, 1.0);
        assert_eq!(letterbox.inner, (640, 480));
        assert_eq!(letterbox.pad, (0, 80));

        let letterbox = Letterbox::fit((1280, 720), 640);
        assert_eq!(letterbox.scale, 0.5);
        assert_eq!(letterbox.inner, (640, 360));
        assert_eq!(letterbox.pad, (0, 140));
        assert_eq!(letterbox.to_frame(320.0, 320.0), (640.0, 360.0));
    }

    #[test]
    fn test_decode_undoes_letterbox_padding() {
        let (dims, data) = tensor(&[[320.0, 320.0, 64.0, 64.0, 0.9, 0.1]]);
        let detections = decode_predictions(&dims, &data, &params());

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, SlotClass::OccupiedSlot);
        // Square in, square out: only the 80px top band is removed
        assert_eq!(detections[0].bbox, BoundingBox::new(288, 208, 352, 272));
    }

    #[test]
    fn test_decode_drops_boxes_inside_padding() {
        let (dims, data) = tensor(&[[320.0, 30.0, 64.0, 40.0, 0.9, 0.1]]);
        assert!(decode_predictions(&dims, &data, &params()).is_empty());
    }

    #[test]
    fn test_decode_drops_low_confidence() {
        let (dims, data) = tensor(&[
            [100.0, 100.0, 40.0, 40.0, 0.39, 0.2],
            [300.0, 300.0, 40.0, 40.0, 0.1, 0.4],
        ]);
        let detections = decode_predictions(&dims, &data, &params());

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, SlotClass::FreeSlot);
    }

    #[test]
    fn test_decode_ignores_classes_outside_label_table() {
        // Three class rows; the third class wins and has no label
        let dims = vec![1, 7, 1];
        let data = vec![100.0, 100.0, 40.0, 40.0, 0.5, 0.1, 0.9];

        assert!(decode_predictions(&dims, &data, &params()).is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed_shapes() {
        assert!(decode_predictions(&[1, 4, 10], &[0.0; 40], &params()).is_empty());
        assert!(decode_predictions(&[1, 6, 10], &[0.0; 12], &params()).is_empty());
        assert!(decode_predictions(&[2, 3, 4, 5], &[], &params()).is_empty());
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap_only() {
        let strong = Detection::new(SlotClass::OccupiedSlot, BoundingBox::new(0, 0, 100, 100), 0.9);
        let weak = Detection::new(SlotClass::OccupiedSlot, BoundingBox::new(5, 5, 100, 100), 0.6);
        let other_class = Detection::new(SlotClass::FreeSlot, BoundingBox::new(5, 5, 100, 100), 0.5);

        let kept = non_max_suppression(vec![weak, other_class.clone(), strong.clone()], 0.45);

        assert_eq!(kept, vec![strong, other_class]);
    }
}
