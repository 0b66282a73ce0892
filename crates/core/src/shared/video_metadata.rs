use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Total frame count as reported by the container; 0 when unknown.
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}
