use std::sync::{Arc, Mutex};

use crate::detection::domain::detection::Detection;
use crate::detection::domain::mask_detector::MaskDetector;
use crate::shared::frame::Frame;

/// Serializes access to one detector instance shared by many sessions/jobs.
///
/// A loaded model is the only resource shared across streams; if its
/// adapter is not reentrant, every caller clones this wrapper and calls
/// go through one mutex. Tracker/gate state stays per-stream.
#[derive(Clone)]
pub struct SharedDetector {
    inner: Arc<Mutex<Box<dyn MaskDetector>>>,
}

impl SharedDetector {
    pub fn new(detector: Box<dyn MaskDetector>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(detector)),
        }
    }
}

impl MaskDetector for SharedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| "shared detector mutex poisoned")?;
        guard.detect(frame)
    }
}
