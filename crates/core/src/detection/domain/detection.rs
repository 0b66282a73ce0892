use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates with `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        debug_assert!(x1 < x2 && y1 < y2, "box corners must be ordered");
        Self { x1, y1, x2, y2 }
    }

    pub fn centroid(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Classification outcome for one detected face.
///
/// Closed set; the violation subset (labels that may alert) is
/// configuration, not part of the label itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MaskLabel {
    MaskOn,
    NoMask,
    MaskIncorrect,
}

impl MaskLabel {
    pub const ALL: &[MaskLabel] = &[MaskLabel::MaskOn, MaskLabel::NoMask, MaskLabel::MaskIncorrect];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskLabel::MaskOn => "MASK_ON",
            MaskLabel::NoMask => "NO_MASK",
            MaskLabel::MaskIncorrect => "MASK_INCORRECT",
        }
    }
}

impl std::fmt::Display for MaskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MaskLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MASK_ON" => Ok(MaskLabel::MaskOn),
            "NO_MASK" => Ok(MaskLabel::NoMask),
            "MASK_INCORRECT" => Ok(MaskLabel::MaskIncorrect),
            other => Err(format!("unknown label: {other}")),
        }
    }
}

/// One raw observation from the detector/classifier adapter.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: MaskLabel,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Stable identity assigned by a tracker. Unique within one stream's
/// lifetime and never reused after eviction.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A detection with its tracker-assigned identity.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedDetection {
    pub detection: Detection,
    pub track_id: TrackId,
}
