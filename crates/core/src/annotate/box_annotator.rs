//! Draws detection results into RGB frames for annotated output artifacts.
//!
//! Compliant faces get a green outline, violations red/amber, following the
//! original overlay scheme. A filled tag bar above each box carries the
//! label color; alerting detections get a doubled border. Exact labels and
//! confidences live in the event log, not in pixels.

use crate::detection::domain::detection::MaskLabel;
use crate::pipeline::frame_pipeline::AlertedDetection;
use crate::shared::frame::Frame;

const BORDER_THICKNESS: usize = 2;
const TAG_BAR_HEIGHT: usize = 6;

pub struct BoxAnnotator {
    thickness: usize,
}

impl BoxAnnotator {
    pub fn new() -> Self {
        Self {
            thickness: BORDER_THICKNESS,
        }
    }
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

fn label_color(label: MaskLabel) -> [u8; 3] {
    match label {
        MaskLabel::MaskOn => [0, 200, 80],
        MaskLabel::NoMask => [220, 40, 40],
        MaskLabel::MaskIncorrect => [230, 160, 30],
    }
}

impl BoxAnnotator {
    pub fn annotate(&self, frame: &mut Frame, detections: &[AlertedDetection]) {
        for det in detections {
            let bbox = &det.detection.bbox;
            let color = label_color(det.detection.label);
            let thickness = if det.alert {
                self.thickness * 2
            } else {
                self.thickness
            };

            let (w, h) = (frame.width() as usize, frame.height() as usize);
            let x1 = (bbox.x1.max(0.0) as usize).min(w.saturating_sub(1));
            let y1 = (bbox.y1.max(0.0) as usize).min(h.saturating_sub(1));
            let x2 = (bbox.x2.max(0.0) as usize).min(w);
            let y2 = (bbox.y2.max(0.0) as usize).min(h);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            draw_border(frame, x1, y1, x2, y2, thickness, color);

            // Tag bar sits above the box when there is room, inside otherwise.
            let bar_top = y1.saturating_sub(TAG_BAR_HEIGHT);
            fill_rect(frame, x1, bar_top, x2, bar_top + TAG_BAR_HEIGHT, color);
        }
    }
}

fn draw_border(
    frame: &mut Frame,
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
    thickness: usize,
    color: [u8; 3],
) {
    let top_end = (y1 + thickness).min(y2);
    let bottom_start = y2.saturating_sub(thickness).max(y1);
    fill_rect(frame, x1, y1, x2, top_end, color);
    fill_rect(frame, x1, bottom_start, x2, y2, color);

    let left_end = (x1 + thickness).min(x2);
    let right_start = x2.saturating_sub(thickness).max(x1);
    fill_rect(frame, x1, y1, left_end, y2, color);
    fill_rect(frame, right_start, y1, x2, y2, color);
}

fn fill_rect(frame: &mut Frame, x1: usize, y1: usize, x2: usize, y2: usize, color: [u8; 3]) {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let mut pixels = frame.as_ndarray_mut();
    for row in y1..y2.min(h) {
        for col in x1..x2.min(w) {
            for (c, value) in color.iter().enumerate() {
                pixels[[row, col, c]] = *value;
            }
        }
    }
}
