use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::MaskLabel;
use crate::shared::constants::{
    DEFAULT_COOLDOWN_SECONDS, JOB_WORKERS, TRACKER_MATCH_DISTANCE, TRACKER_MAX_MISSED,
    VIDEO_SAMPLE_FPS,
};

/// Tuning surface consumed by the core. Owned by the hosting process;
/// every field has a deployment-validated default so a missing or partial
/// config file still yields a working system.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Default minimum seconds between alerts for one (track, label).
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Consecutive unmatched frames before a track is evicted.
    #[serde(default = "default_max_missed_frames")]
    pub max_missed_frames: usize,

    /// Max centroid distance in pixels for track matching.
    #[serde(default = "default_match_distance")]
    pub match_distance: f64,

    /// Frames per second analyzed when sampling uploaded videos.
    #[serde(default = "default_sample_fps")]
    pub sample_fps: f64,

    /// Video-analysis worker pool size.
    #[serde(default = "default_job_workers")]
    pub job_workers: usize,

    /// Labels that are alert-worthy. Labels outside this set never alert.
    #[serde(default = "default_violation_labels")]
    pub violation_labels: HashSet<MaskLabel>,

    /// Whether alert snapshots are persisted by default.
    #[serde(default)]
    pub snapshots_enabled: bool,

    /// Directory for annotated output artifacts.
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Directory for alert snapshots.
    #[serde(default = "default_captures_dir")]
    pub captures_dir: PathBuf,
}

fn default_cooldown_seconds() -> u64 {
    DEFAULT_COOLDOWN_SECONDS
}

fn default_max_missed_frames() -> usize {
    TRACKER_MAX_MISSED
}

fn default_match_distance() -> f64 {
    TRACKER_MATCH_DISTANCE
}

fn default_sample_fps() -> f64 {
    VIDEO_SAMPLE_FPS
}

fn default_job_workers() -> usize {
    JOB_WORKERS
}

fn default_violation_labels() -> HashSet<MaskLabel> {
    HashSet::from([MaskLabel::NoMask, MaskLabel::MaskIncorrect])
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("data/outputs")
}

fn default_captures_dir() -> PathBuf {
    PathBuf::from("data/captures")
}

impl Default for WatchConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty config deserializes via field defaults")
    }
}

impl WatchConfig {
    /// Loads a JSON config file, falling back to defaults when the path is
    /// absent or the file is missing/unparseable (a warning is logged for
    /// the latter so typos don't silently revert the deployment).
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("config file {} is invalid ({e}), using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("config file {} unreadable ({e}), using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Cooldown as a duration; clamped to at least one second.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds.max(1))
    }
}
