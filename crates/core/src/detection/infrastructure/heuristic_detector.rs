//! Deterministic stand-in for the real detector/classifier.
//!
//! Scans a coarse grid and treats textured cells as faces, scoring a label
//! from luminance/contrast statistics. Lets the whole pipeline run without
//! model weights; predictions are stable for a given input.

use crate::detection::domain::detection::{BoundingBox, Detection, MaskLabel};
use crate::detection::domain::mask_detector::MaskDetector;
use crate::shared::frame::Frame;

const GRID_COLS: u32 = 4;
const GRID_ROWS: u32 = 4;

/// Minimum per-cell standard deviation for a cell to count as a face.
const MIN_CONTRAST: f64 = 24.0;

/// Fraction of the cell trimmed off each edge for the reported box.
const BOX_INSET: f64 = 0.1;

pub struct HeuristicDetector {
    min_contrast: f64,
}

impl HeuristicDetector {
    pub fn new() -> Self {
        Self {
            min_contrast: MIN_CONTRAST,
        }
    }

    pub fn with_min_contrast(min_contrast: f64) -> Self {
        Self { min_contrast }
    }
}

impl Default for HeuristicDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskDetector for HeuristicDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let cell_w = frame.width() / GRID_COLS;
        let cell_h = frame.height() / GRID_ROWS;
        if cell_w == 0 || cell_h == 0 {
            return Ok(Vec::new());
        }

        let mut detections = Vec::new();
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let x = col * cell_w;
                let y = row * cell_h;
                let (mean, stddev) = cell_stats(frame, x, y, cell_w, cell_h);
                if stddev < self.min_contrast {
                    continue;
                }

                let (label, confidence) = score(mean, stddev);
                let inset_x = cell_w as f64 * BOX_INSET;
                let inset_y = cell_h as f64 * BOX_INSET;
                detections.push(Detection {
                    bbox: BoundingBox::new(
                        x as f64 + inset_x,
                        y as f64 + inset_y,
                        (x + cell_w) as f64 - inset_x,
                        (y + cell_h) as f64 - inset_y,
                    ),
                    label,
                    confidence,
                });
            }
        }
        Ok(detections)
    }
}

/// Mean and standard deviation of the luminance inside one grid cell.
fn cell_stats(frame: &Frame, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
    let pixels = frame.as_ndarray();
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let count = (w * h) as f64;

    for row in y..y + h {
        for col in x..x + w {
            let r = pixels[[row as usize, col as usize, 0]] as f64;
            let g = pixels[[row as usize, col as usize, 1]] as f64;
            let b = pixels[[row as usize, col as usize, 2]] as f64;
            let luma = 0.299 * r + 0.587 * g + 0.114 * b;
            sum += luma;
            sum_sq += luma * luma;
        }
    }

    let mean = sum / count;
    let variance = (sum_sq / count - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Maps cell statistics to a label and confidence.
///
/// Same feature bands as the original heuristic classifier: a combined
/// score below 0.35 reads as an uncovered face, 0.35..0.55 as an
/// incorrectly worn mask, above as compliant. Confidence ramps away from
/// the band edges and is clamped to `[0.5, 0.99]`.
fn score(mean: f64, stddev: f64) -> (MaskLabel, f64) {
    let feature = 0.6 * (mean / 255.0) + 0.4 * (stddev / 100.0).min(1.0);

    let (label, confidence) = if feature < 0.35 {
        (MaskLabel::NoMask, 0.80 + (0.35 - feature) * 0.2)
    } else if feature < 0.55 {
        (MaskLabel::MaskIncorrect, 0.75 + (0.45 - feature).abs() * 0.2)
    } else {
        (MaskLabel::MaskOn, 0.82 + (feature - 0.55) * 0.15)
    };

    (label, confidence.clamp(0.5, 0.99))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame with a checkered (textured) block painted into one grid cell.
    fn frame_with_textured_cell(value_a: u8, value_b: u8) -> Frame {
        let (w, h) = (64u32, 64u32);
        let mut data = vec![0u8; (w * h * 3) as usize];
        // Paint cell (0,0): 16x16 pixels, alternating values.
        for row in 0..16usize {
            for col in 0..16usize {
                let v = if (row + col) % 2 == 0 { value_a } else { value_b };
                let offset = (row * w as usize + col) * 3;
                data[offset] = v;
                data[offset + 1] = v;
                data[offset + 2] = v;
            }
        }
        Frame::new(data, w, h, 0)
    }

    #[test]
    fn test_flat_frame_yields_no_detections() {
        let frame = Frame::new(vec![128u8; 64 * 64 * 3], 64, 64, 0);
        let mut detector = HeuristicDetector::new();
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_textured_cell_is_detected() {
        let frame = frame_with_textured_cell(0, 255);
        let mut detector = HeuristicDetector::new();
        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        // Box sits inside the first 16x16 cell.
        let bbox = detections[0].bbox;
        assert!(bbox.x1 >= 0.0 && bbox.x2 <= 16.0);
        assert!(bbox.y1 >= 0.0 && bbox.y2 <= 16.0);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let frame = frame_with_textured_cell(0, 255);
        let mut detector = HeuristicDetector::new();
        let first = detector.detect(&frame).unwrap();
        let second = detector.detect(&frame).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_dim_textured_cell_reads_as_violation() {
        // Mean luminance ~32, high contrast: feature lands below 0.35.
        let frame = frame_with_textured_cell(0, 64);
        let mut detector = HeuristicDetector::new();
        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, MaskLabel::NoMask);
    }

    #[test]
    fn test_bright_textured_cell_reads_as_compliant() {
        let frame = frame_with_textured_cell(180, 255);
        let mut detector = HeuristicDetector::new();
        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, MaskLabel::MaskOn);
    }

    #[test]
    fn test_confidence_within_bounds() {
        let frame = frame_with_textured_cell(0, 255);
        let mut detector = HeuristicDetector::new();
        for det in detector.detect(&frame).unwrap() {
            assert!(det.confidence >= 0.5 && det.confidence <= 0.99);
        }
    }

    #[test]
    fn test_tiny_frame_yields_nothing() {
        let frame = Frame::new(vec![255u8; 2 * 2 * 3], 2, 2, 0);
        let mut detector = HeuristicDetector::new();
        assert!(detector.detect(&frame).unwrap().is_empty());
    }
}
