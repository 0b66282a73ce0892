use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::domain::detection::MaskLabel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a video-analysis job.
///
/// `Queued → Processing` is the only entry to active work;
/// `Processing → {Completed, Failed, Cancelled}` are the only exits, plus
/// `Queued → Cancelled` for jobs withdrawn before a worker picks them up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Aggregated results of a completed job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Sampled frames the job was scheduled to analyze.
    pub total_frames: usize,
    pub processed_frames: usize,
    pub label_counts: HashMap<MaskLabel, usize>,
    pub total_alerts: usize,
}

/// Point-in-time snapshot of one job, as returned to status pollers.
/// The manager owns the live state; callers only ever see copies.
#[derive(Clone, Debug, Serialize)]
pub struct VideoJob {
    pub job_id: JobId,
    pub status: JobStatus,
    /// 0-100; monotonically non-decreasing, exactly 100 only once completed.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: Option<JobSummary>,
    pub error: Option<String>,
    pub output_ref: Option<String>,
}

impl VideoJob {
    pub fn queued(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            progress: 0,
            created_at: Utc::now(),
            completed_at: None,
            summary: None,
            error: None,
            output_ref: None,
        }
    }
}
