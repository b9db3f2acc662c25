//! Artifact writer: annotated JPEG frames and YOLO-format label files.
//!
//! Writes happen on a dedicated thread behind a single-slot handoff. When a
//! previous write is still in flight the new artifact is dropped and
//! counted; the pipeline never blocks on I/O.

use crate::{
    config::ArtifactConfig,
    depth::DepthStats,
    detector::{Detection, TargetClass},
};
use image::codecs::jpeg::JpegEncoder;
use ndarray::Array3;
use std::{
    fmt::Write as _,
    fs,
    io::BufWriter,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, SyncSender, TrySendError},
        Arc,
    },
    thread,
};
use time::OffsetDateTime;

/// Everything needed to write the artifacts of one frame.
#[derive(Debug)]
pub struct FrameArtifacts {
    /// Source frame index.
    pub index: u64,
    /// Left rectified image, `(H, W, 3)` RGB.
    pub image: Array3<u8>,
    /// Detections of this frame.
    pub detections: Vec<Detection>,
    /// Depth statistics aligned with `detections`.
    pub stats: Vec<DepthStats>,
}

/// Final writer counters, persisted into the session statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct WriterCounts {
    /// Annotated JPEG files written.
    pub jpeg_written: u64,
    /// Label text files written.
    pub txt_written: u64,
    /// Artifacts dropped because a write was still in flight.
    pub drops: u64,
    /// Per-frame write failures.
    pub io_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    jpeg_written: AtomicU64,
    txt_written: AtomicU64,
    drops: AtomicU64,
    io_errors: AtomicU64,
}

/// Bounded, fire-and-forget writer of per-frame artifacts.
#[derive(Debug)]
pub struct ArtifactWriter {
    tx: Option<SyncSender<FrameArtifacts>>,
    thread: Option<thread::JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl ArtifactWriter {
    /// Spawns the writer thread for a session writing into `session_dir`.
    #[must_use]
    pub fn spawn(config: &ArtifactConfig, session_dir: &Path) -> Self {
        let (tx, rx) = mpsc::sync_channel::<FrameArtifacts>(1);
        let counters = Arc::new(Counters::default());
        let thread = thread::Builder::new()
            .name("talon-artifact-writer".into())
            .spawn({
                let counters = Arc::clone(&counters);
                let config = config.clone();
                let frames_dir = session_dir.join("frames");
                move || {
                    while let Ok(artifacts) = rx.recv() {
                        write_frame(&config, &frames_dir, &artifacts, &counters);
                    }
                }
            })
            .expect("failed to spawn the artifact writer thread");
        Self { tx: Some(tx), thread: Some(thread), counters }
    }

    /// Hands a frame off to the writer thread, dropping it when the
    /// previous write has not completed.
    pub fn dispatch(&self, artifacts: FrameArtifacts) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(artifacts) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.counters.drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Finishes all in-flight writes and returns the final counters.
    #[must_use]
    pub fn finish(mut self) -> WriterCounts {
        drop(self.tx.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        WriterCounts {
            jpeg_written: self.counters.jpeg_written.load(Ordering::Relaxed),
            txt_written: self.counters.txt_written.load(Ordering::Relaxed),
            drops: self.counters.drops.load(Ordering::Relaxed),
            io_errors: self.counters.io_errors.load(Ordering::Relaxed),
        }
    }
}

fn write_frame(
    config: &ArtifactConfig,
    frames_dir: &Path,
    artifacts: &FrameArtifacts,
    counters: &Counters,
) {
    if let Err(err) = fs::create_dir_all(frames_dir) {
        tracing::error!("failed to create {}: {err}", frames_dir.display());
        counters.io_errors.fetch_add(1, Ordering::Relaxed);
        return;
    }
    if config.save_annotated_image {
        let path = frames_dir.join(format!("frame_{:06}.jpg", artifacts.index));
        match write_annotated_jpeg(&path, artifacts, config.jpeg_quality) {
            Ok(()) => {
                counters.jpeg_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::error!("failed to write {}: {err}", path.display());
                counters.io_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    if config.save_label_file {
        let path = frames_dir.join(format!("frame_{:06}.txt", artifacts.index));
        let (height, width, _) = artifacts.image.dim();
        let text = encode_labels(&artifacts.detections, width, height);
        match fs::write(&path, text) {
            Ok(()) => {
                counters.txt_written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::error!("failed to write {}: {err}", path.display());
                counters.io_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

fn write_annotated_jpeg(
    path: &Path,
    artifacts: &FrameArtifacts,
    quality: u8,
) -> eyre::Result<()> {
    let mut image = artifacts.image.clone();
    annotate(&mut image, &artifacts.detections, &artifacts.stats);
    let (height, width, _) = image.dim();
    let file = BufWriter::new(fs::File::create(path)?);
    let mut encoder = JpegEncoder::new_with_quality(file, quality);
    #[allow(clippy::cast_possible_truncation)]
    encoder.encode(
        image.as_slice().expect("annotated image is contiguous"),
        width as u32,
        height as u32,
        image::ColorType::Rgb8,
    )?;
    Ok(())
}

/// Names the per-session output directory after its start time.
#[must_use]
pub fn session_dir_name(started: OffsetDateTime) -> String {
    format!(
        "session_{:04}{:02}{:02}_{:02}{:02}{:02}",
        started.year(),
        u8::from(started.month()),
        started.day(),
        started.hour(),
        started.minute(),
        started.second()
    )
}

/// Encodes detections as YOLO label lines: `class_id cx cy w h`, normalized
/// to `[0, 1]`, one line per detection with a trailing newline.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn encode_labels(detections: &[Detection], width: usize, height: usize) -> String {
    let (w, h) = (width as f64, height as f64);
    let mut out = String::new();
    for detection in detections {
        let bbox = &detection.bbox;
        let cx = f64::from(bbox.x1 + bbox.x2) / 2.0 / w;
        let cy = f64::from(bbox.y1 + bbox.y2) / 2.0 / h;
        let bw = f64::from(bbox.x2 - bbox.x1) / w;
        let bh = f64::from(bbox.y2 - bbox.y1) / h;
        let _ = writeln!(
            out,
            "{} {cx:.6} {cy:.6} {bw:.6} {bh:.6}",
            detection.class.id()
        );
    }
    out
}

/// One decoded label line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Label {
    /// Raw class identifier.
    pub class_id: u32,
    /// Normalized box center x.
    pub cx: f64,
    /// Normalized box center y.
    pub cy: f64,
    /// Normalized box width.
    pub w: f64,
    /// Normalized box height.
    pub h: f64,
}

/// Decodes a YOLO label file.
///
/// # Errors
///
/// Fails on lines that do not hold exactly five numeric fields.
pub fn decode_labels(text: &str) -> eyre::Result<Vec<Label>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [class_id, cx, cy, w, h] = fields.as_slice() else {
                eyre::bail!("malformed label line: {line:?}");
            };
            Ok(Label {
                class_id: class_id.parse()?,
                cx: cx.parse()?,
                cy: cy.parse()?,
                w: w.parse()?,
                h: h.parse()?,
            })
        })
        .collect()
}

const CLASS_WITHIN_COLOR: [u8; 3] = [64, 220, 64];
const CLASS_BEYOND_COLOR: [u8; 3] = [230, 64, 32];
const CLASS_OTHER_COLOR: [u8; 3] = [240, 200, 40];

fn class_color(class: TargetClass) -> [u8; 3] {
    match class {
        TargetClass::WithinRange => CLASS_WITHIN_COLOR,
        TargetClass::OutOfRange => CLASS_BEYOND_COLOR,
        TargetClass::Other(_) => CLASS_OTHER_COLOR,
    }
}

/// Overlays detection rectangles and labels onto the image.
pub fn annotate(image: &mut Array3<u8>, detections: &[Detection], stats: &[DepthStats]) {
    for (i, detection) in detections.iter().enumerate() {
        let color = class_color(detection.class);
        let (height, width, _) = image.dim();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (x1, y1, x2, y2) = (
            (detection.bbox.x1.max(0.0) as usize).min(width),
            (detection.bbox.y1.max(0.0) as usize).min(height),
            (detection.bbox.x2.max(0.0) as usize).min(width),
            (detection.bbox.y2.max(0.0) as usize).min(height),
        );
        draw_rect(image, x1, y1, x2, y2, color);
        let label = match stats.get(i).and_then(DepthStats::mean) {
            Some(mean) => format!("C:{:.2} D:{mean:.2}m", detection.confidence),
            None => format!("C:{:.2} D:--", detection.confidence),
        };
        let text_y = y1.saturating_sub(GLYPH_HEIGHT * GLYPH_SCALE + 2);
        draw_text(image, &label, x1, text_y, color);
    }
}

const RECT_THICKNESS: usize = 2;

fn draw_rect(image: &mut Array3<u8>, x1: usize, y1: usize, x2: usize, y2: usize, color: [u8; 3]) {
    if x2 <= x1 || y2 <= y1 {
        return;
    }
    for t in 0..RECT_THICKNESS {
        for x in x1..x2 {
            put_pixel(image, x, y1 + t, color);
            put_pixel(image, x, (y2 - 1).saturating_sub(t), color);
        }
        for y in y1..y2 {
            put_pixel(image, x1 + t, y, color);
            put_pixel(image, (x2 - 1).saturating_sub(t), y, color);
        }
    }
}

fn put_pixel(image: &mut Array3<u8>, x: usize, y: usize, color: [u8; 3]) {
    let (height, width, _) = image.dim();
    if x < width && y < height {
        for (channel, &value) in color.iter().enumerate() {
            image[(y, x, channel)] = value;
        }
    }
}

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;
const GLYPH_SCALE: usize = 2;

// 5x7 bitmaps, one u8 row each, bit 4 leftmost. Covers exactly the overlay
// label alphabet.
fn glyph(c: char) -> [u8; GLYPH_HEIGHT] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'm' => [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10101, 0b10101],
        ' ' => [0b00000; GLYPH_HEIGHT],
        _ => [0b11111; GLYPH_HEIGHT],
    }
}

fn draw_text(image: &mut Array3<u8>, text: &str, x: usize, y: usize, color: [u8; 3]) {
    let mut cursor_x = x;
    for c in text.chars() {
        let bitmap = glyph(c);
        for (row, bits) in bitmap.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..GLYPH_SCALE {
                    for dx in 0..GLYPH_SCALE {
                        put_pixel(
                            image,
                            cursor_x + col * GLYPH_SCALE + dx,
                            y + row * GLYPH_SCALE + dy,
                            color,
                        );
                    }
                }
            }
        }
        cursor_x += (GLYPH_WIDTH + 1) * GLYPH_SCALE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::BBox;
    use ndarray::Array3;

    fn detection(class: TargetClass, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection { class, bbox: BBox { x1, y1, x2, y2 }, confidence: 0.875 }
    }

    #[test]
    fn test_label_encoding() {
        let detections = vec![
            detection(TargetClass::WithinRange, 10.0, 20.0, 30.0, 60.0),
            detection(TargetClass::OutOfRange, 0.0, 0.0, 100.0, 100.0),
        ];
        let text = encode_labels(&detections, 100, 100);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("0 0.200000 0.400000 0.200000 0.400000"));
        assert_eq!(lines.next(), Some("1 0.500000 0.500000 1.000000 1.000000"));
        assert_eq!(lines.next(), None);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_label_round_trip_is_byte_stable() {
        let detections = vec![
            detection(TargetClass::WithinRange, 13.0, 27.0, 311.0, 454.0),
            detection(TargetClass::Other(3), 0.5, 1.5, 640.0, 360.0),
        ];
        let text = encode_labels(&detections, 640, 360);
        let labels = decode_labels(&text).unwrap();
        let mut reencoded = String::new();
        for label in &labels {
            use std::fmt::Write as _;
            let _ = writeln!(
                reencoded,
                "{} {:.6} {:.6} {:.6} {:.6}",
                label.class_id, label.cx, label.cy, label.w, label.h
            );
        }
        assert_eq!(text, reencoded);
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(decode_labels("0 0.5 0.5 0.1").is_err());
        assert!(decode_labels("x 0.5 0.5 0.1 0.1").is_err());
        assert!(decode_labels("").unwrap().is_empty());
    }

    #[test]
    fn test_annotate_draws_the_class_color() {
        let mut image = Array3::zeros((64, 64, 3));
        let detections = vec![detection(TargetClass::WithinRange, 10.0, 20.0, 40.0, 50.0)];
        let stats = vec![DepthStats::NoDepth];
        annotate(&mut image, &detections, &stats);
        assert_eq!(
            [image[(20, 10, 0)], image[(20, 10, 1)], image[(20, 10, 2)]],
            CLASS_WITHIN_COLOR
        );
        // Inside the rectangle stays untouched.
        assert_eq!(image[(35, 25, 0)], 0);
    }

    #[test]
    fn test_annotate_tolerates_out_of_frame_boxes() {
        let mut image = Array3::zeros((32, 32, 3));
        let detections = vec![detection(TargetClass::OutOfRange, -10.0, -10.0, 200.0, 200.0)];
        annotate(&mut image, &detections, &[DepthStats::NoDepth]);
        assert_eq!(
            [image[(0, 0, 0)], image[(0, 0, 1)], image[(0, 0, 2)]],
            CLASS_BEYOND_COLOR
        );
    }

    #[test]
    fn test_session_dir_name() {
        let started = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(session_dir_name(started), "session_20231114_221320");
    }
}
