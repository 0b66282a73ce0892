//! Typed messages for the live detection protocol.
//!
//! One JSON object per message, discriminated by a `type` field. Clients
//! push config updates and frames at any time; the server answers each
//! frame with one result message.

use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::{MaskLabel, TrackId};
use crate::pipeline::frame_pipeline::{AlertedDetection, FrameReport};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session tuning; absent fields leave the current value unchanged.
    Config {
        #[serde(default)]
        cooldown_seconds: Option<u64>,
        #[serde(default)]
        snapshots_enabled: Option<bool>,
    },
    /// One encoded camera frame, base64 (optionally a data URL).
    Frame { data: String },
    Ping,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Echoes the effective settings after a config update.
    ConfigAck {
        cooldown_seconds: u64,
        snapshots_enabled: bool,
    },
    Result {
        detections: Vec<DetectionPayload>,
        faces_count: usize,
        /// True when any detection in this frame alerted.
        alert: bool,
    },
    /// The offending message was dropped; the session stays open.
    Rejected { reason: String },
    Pong,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionPayload {
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
    pub label: MaskLabel,
    pub confidence: f64,
    pub track_id: Option<TrackId>,
    pub alert: bool,
}

impl From<&AlertedDetection> for DetectionPayload {
    fn from(det: &AlertedDetection) -> Self {
        Self {
            bbox: det.detection.bbox.as_array(),
            label: det.detection.label,
            confidence: det.detection.confidence,
            track_id: det.track_id,
            alert: det.alert,
        }
    }
}

impl From<&FrameReport> for ServerMessage {
    fn from(report: &FrameReport) -> Self {
        ServerMessage::Result {
            detections: report.detections.iter().map(DetectionPayload::from).collect(),
            faces_count: report.faces_count,
            alert: report.alert,
        }
    }
}
