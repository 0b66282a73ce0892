use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Port for the external detector/classifier collaborator.
///
/// Given a frame, returns one `Detection` per face found. Implementations
/// may be stateful (frame caches, warmed-up model sessions), hence
/// `&mut self`. Failures are recoverable at the call site: the pipeline
/// treats a failed frame as having zero detections.
pub trait MaskDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
