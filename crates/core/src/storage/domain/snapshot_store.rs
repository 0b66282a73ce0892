use crate::detection::domain::detection::BoundingBox;
use crate::shared::frame::Frame;

/// Port for the file-storage collaborator that persists alert evidence.
///
/// `save` crops the detection box out of the frame, stores it, and returns
/// an opaque reference for the event log. Shared across sessions/jobs,
/// hence `&self` + `Sync`.
pub trait SnapshotStore: Send + Sync {
    fn save(
        &self,
        frame: &Frame,
        bbox: &BoundingBox,
        hint: &str,
    ) -> Result<String, Box<dyn std::error::Error>>;
}
