use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::{MaskLabel, TrackId};

/// Where a logged detection came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Live,
    Image,
    Video,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Live => "live",
            EventSource::Image => "image",
            EventSource::Video => "video",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(EventSource::Live),
            "image" => Ok(EventSource::Image),
            "video" => Ok(EventSource::Video),
            other => Err(format!("unknown event source: {other}")),
        }
    }
}

/// Identifier assigned by the event store on append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

/// Immutable record of one accepted alert. Written once; never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub label: MaskLabel,
    pub confidence: f64,
    /// Absent for single-shot image detections.
    pub track_id: Option<TrackId>,
    pub snapshot_ref: Option<String>,
    /// Opaque payload (frame index, box coordinates, ...).
    #[serde(default)]
    pub meta: serde_json::Value,
}
