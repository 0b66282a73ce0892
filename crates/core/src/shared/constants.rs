/// Minimum seconds between two alerts for the same track and violation.
pub const DEFAULT_COOLDOWN_SECONDS: u64 = 10;

/// Max consecutive frames a track can go unmatched before eviction
/// (~6 seconds at the default 5 fps analysis rate).
pub const TRACKER_MAX_MISSED: usize = 30;

/// Max centroid distance in pixels for a detection to claim an existing track.
pub const TRACKER_MATCH_DISTANCE: f64 = 75.0;

/// Frames per second actually analyzed when sampling uploaded videos.
pub const VIDEO_SAMPLE_FPS: f64 = 5.0;

/// Concurrent video-analysis workers.
pub const JOB_WORKERS: usize = 2;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
