//! YOLO-family detector over a prebuilt TensorRT engine.
//!
//! The engine consumes a letterboxed CHW float image and produces a flat
//! `[anchors, 5 + classes]` prediction tensor with grid decoding baked in at
//! export time. Everything around the engine call (letterboxing, candidate
//! decoding, class-wise non-maximum suppression and the mapping back to
//! source pixel coordinates) is plain Rust and unit-tested off-device.

use super::{BBox, Detection, TargetClass};
use ndarray::ArrayView3;

/// Letterbox transform from source pixels to the square network input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    /// Computes the transform placing a `src_w`x`src_h` image centered into
    /// a `dst`x`dst` square without distorting the aspect ratio.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(src_w: usize, src_h: usize, dst: usize) -> Self {
        let scale = (dst as f32 / src_w as f32).min(dst as f32 / src_h as f32);
        let pad_x = (dst as f32 - src_w as f32 * scale) / 2.0;
        let pad_y = (dst as f32 - src_h as f32 * scale) / 2.0;
        Self { scale, pad_x, pad_y }
    }

    /// Maps a network-input coordinate back to source pixels.
    #[must_use]
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterboxes an `(H, W, 3)` RGB image into a normalized CHW float buffer
/// of shape `(3, dst, dst)`. Padding pixels are mid-gray, matching the
/// training-time convention.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn letterbox_chw(image: ArrayView3<'_, u8>, dst: usize) -> Vec<f32> {
    let (src_h, src_w, _) = image.dim();
    let lb = Letterbox::new(src_w, src_h, dst);
    let mut out = vec![0.447; 3 * dst * dst];
    for y in 0..dst {
        let (_, src_y) = lb.unmap(0.0, y as f32 + 0.5);
        if src_y < 0.0 || src_y >= src_h as f32 {
            continue;
        }
        let src_y = src_y as usize;
        for x in 0..dst {
            let (src_x, _) = lb.unmap(x as f32 + 0.5, 0.0);
            if src_x < 0.0 || src_x >= src_w as f32 {
                continue;
            }
            let src_x = src_x as usize;
            for channel in 0..3 {
                out[channel * dst * dst + y * dst + x] =
                    f32::from(image[(src_y, src_x, channel)]) / 255.0;
            }
        }
    }
    out
}

/// Decodes raw predictions into thresholded detections in source pixel
/// coordinates.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn decode(
    output: &[f32],
    classes: usize,
    lb: &Letterbox,
    confidence_threshold: f32,
    src_w: usize,
    src_h: usize,
) -> Vec<Detection> {
    let stride = 5 + classes;
    let mut detections = Vec::new();
    for row in output.chunks_exact(stride) {
        let objectness = row[4];
        let (class_id, class_score) = row[5..]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or((0, 0.0), |(id, score)| (id, *score));
        let confidence = objectness * class_score;
        if confidence < confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = lb.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.unmap(cx + w / 2.0, cy + h / 2.0);
        let x1 = x1.clamp(0.0, src_w as f32);
        let y1 = y1.clamp(0.0, src_h as f32);
        let x2 = x2.clamp(0.0, src_w as f32);
        let y2 = y2.clamp(0.0, src_h as f32);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation)]
        detections.push(Detection {
            class: TargetClass::from_id(class_id as u32),
            bbox: BBox { x1, y1, x2, y2 },
            confidence,
        });
    }
    detections
}

/// Intersection over union of two boxes.
#[must_use]
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let inter = BBox {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy class-wise non-maximum suppression.
#[must_use]
pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept.iter().any(|existing| {
            existing.class == candidate.class
                && iou(&existing.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
pub use device::YoloDetector;

#[cfg(all(target_arch = "aarch64", target_os = "linux"))]
mod device {
    use super::{decode, letterbox_chw, nms, Letterbox};
    use crate::consts::NMS_IOU_THRESHOLD;
    use crate::detector::{Detection, Detector, InferError, LoadError};
    use ndarray::ArrayView3;
    use std::path::Path;

    /// TensorRT-backed YOLO detector.
    pub struct YoloDetector {
        engine: talon_trt::Engine,
        input_size: usize,
        classes: usize,
        confidence_threshold: f32,
        output: Vec<f32>,
    }

    impl YoloDetector {
        /// Loads a prebuilt engine and validates its bindings.
        ///
        /// # Errors
        ///
        /// Returns [`LoadError`] when the engine cannot be deserialized or
        /// its bindings do not look like a YOLO head.
        pub fn load(engine_path: &Path, confidence_threshold: f32) -> Result<Self, LoadError> {
            let engine =
                talon_trt::Engine::load(engine_path).map_err(|err| LoadError(err.to_string()))?;
            let (channels, height, width) =
                engine.input_shape().map_err(|err| LoadError(err.to_string()))?;
            if channels != 3 || height != width {
                return Err(LoadError(format!(
                    "unexpected input binding {channels}x{height}x{width}"
                )));
            }
            let output_len = engine.output_len().map_err(|err| LoadError(err.to_string()))?;
            let input_size = height as usize;
            // The smallest plausible head has one class: rows of 6 floats.
            let classes = (1..=32)
                .find(|classes| output_len % (5 + classes) == 0)
                .ok_or_else(|| LoadError(format!("unexpected output length {output_len}")))?;
            Ok(Self {
                engine,
                input_size,
                classes,
                confidence_threshold,
                output: vec![0.0; output_len],
            })
        }
    }

    impl Detector for YoloDetector {
        fn infer(&mut self, left: ArrayView3<'_, u8>) -> Result<Vec<Detection>, InferError> {
            let (src_h, src_w, _) = left.dim();
            let input = letterbox_chw(left, self.input_size);
            self.engine
                .execute(&input, &mut self.output)
                .map_err(|err| InferError::Transient(err.to_string()))?;
            let lb = Letterbox::new(src_w, src_h, self.input_size);
            let detections = decode(
                &self.output,
                self.classes,
                &lb,
                self.confidence_threshold,
                src_w,
                src_h,
            );
            Ok(nms(detections, NMS_IOU_THRESHOLD))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    #[test]
    fn test_letterbox_roundtrip() {
        let lb = Letterbox::new(1280, 720, 640);
        // Width-bound scale: 640 / 1280 = 0.5, vertical padding 140.
        assert_relative_eq!(lb.scale, 0.5);
        assert_relative_eq!(lb.pad_x, 0.0);
        assert_relative_eq!(lb.pad_y, 140.0);
        let (x, y) = lb.unmap(320.0, 320.0);
        assert_relative_eq!(x, 640.0);
        assert_relative_eq!(y, 360.0);
    }

    #[test]
    fn test_letterbox_chw_shape_and_padding() {
        let image = Array3::from_elem((10, 20, 3), 255u8);
        let out = letterbox_chw(image.view(), 8);
        assert_eq!(out.len(), 3 * 8 * 8);
        // Rows 0..2 and 6..8 are vertical padding.
        assert_relative_eq!(out[0], 0.447);
        // Center rows hold image content.
        assert_relative_eq!(out[4 * 8 + 3], 1.0);
    }

    #[test]
    fn test_decode_thresholds_and_unmaps() {
        let lb = Letterbox::new(100, 100, 50);
        // Two candidate rows with two classes: one confident within-range
        // target, one below threshold.
        let output = [
            // cx, cy, w, h, obj, class0, class1
            25.0, 25.0, 10.0, 10.0, 0.9, 0.9, 0.1, //
            10.0, 10.0, 4.0, 4.0, 0.2, 0.5, 0.1,
        ];
        let detections = decode(&output, 2, &lb, 0.5, 100, 100);
        assert_eq!(detections.len(), 1);
        let detection = &detections[0];
        assert_eq!(detection.class, TargetClass::WithinRange);
        assert_relative_eq!(detection.bbox.x1, 40.0);
        assert_relative_eq!(detection.bbox.y1, 40.0);
        assert_relative_eq!(detection.bbox.x2, 60.0);
        assert_relative_eq!(detection.bbox.y2, 60.0);
        assert_relative_eq!(detection.confidence, 0.81);
    }

    #[test]
    fn test_decode_passes_unknown_classes_through() {
        let lb = Letterbox::new(64, 64, 64);
        let output = [32.0, 32.0, 8.0, 8.0, 1.0, 0.0, 0.1, 0.9];
        let detections = decode(&output, 3, &lb, 0.5, 64, 64);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, TargetClass::Other(2));
    }

    #[test]
    fn test_iou() {
        let a = BBox { x1: 0.0, y1: 0.0, x2: 10.0, y2: 10.0 };
        let b = BBox { x1: 5.0, y1: 0.0, x2: 15.0, y2: 10.0 };
        let c = BBox { x1: 20.0, y1: 20.0, x2: 30.0, y2: 30.0 };
        assert_relative_eq!(iou(&a, &b), 50.0 / 150.0);
        assert_relative_eq!(iou(&a, &c), 0.0);
        assert_relative_eq!(iou(&a, &a), 1.0);
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let make = |x1: f32, class, confidence| Detection {
            class,
            bbox: BBox { x1, y1: 0.0, x2: x1 + 10.0, y2: 10.0 },
            confidence,
        };
        let detections = vec![
            make(0.0, TargetClass::WithinRange, 0.8),
            make(1.0, TargetClass::WithinRange, 0.9),
            make(1.0, TargetClass::OutOfRange, 0.7),
            make(40.0, TargetClass::WithinRange, 0.6),
        ];
        let kept = nms(detections, 0.45);
        assert_eq!(kept.len(), 3);
        // The strongest overlapping within-range box wins.
        assert_relative_eq!(kept[0].confidence, 0.9);
        assert!(kept.iter().any(|d| d.class == TargetClass::OutOfRange));
        assert!(kept.iter().any(|d| d.bbox.x1 == 40.0));
    }
}
