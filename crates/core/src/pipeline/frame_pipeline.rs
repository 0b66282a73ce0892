//! The per-frame detection chain shared by live sessions and video jobs.
//!
//! detector → tracker → cooldown gate → {snapshot, event log}. One pipeline
//! instance serves exactly one stream; callers differ only in cadence and
//! in the time base they feed the gate (wall-clock vs media time).

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::alerting::cooldown_gate::CooldownGate;
use crate::detection::domain::centroid_tracker::CentroidTracker;
use crate::detection::domain::detection::{Detection, TrackId};
use crate::detection::domain::mask_detector::MaskDetector;
use crate::events::domain::event::{Event, EventSource};
use crate::events::domain::event_store::EventStore;
use crate::shared::config::WatchConfig;
use crate::shared::frame::Frame;
use crate::storage::domain::snapshot_store::SnapshotStore;

/// A detection with its alert decision for this frame.
///
/// `track_id` is absent only on the single-shot image path, where no
/// tracker is involved.
#[derive(Clone, Debug)]
pub struct AlertedDetection {
    pub detection: Detection,
    pub track_id: Option<TrackId>,
    pub alert: bool,
    pub snapshot_ref: Option<String>,
}

/// Everything a caller needs to report one processed frame.
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub detections: Vec<AlertedDetection>,
    pub faces_count: usize,
    /// True when at least one detection alerted this frame.
    pub alert: bool,
}

pub struct FramePipeline {
    detector: Box<dyn MaskDetector>,
    tracker: CentroidTracker,
    gate: CooldownGate,
    source: EventSource,
    snapshots_enabled: bool,
    store: Arc<dyn EventStore>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    frame_index: u64,
}

impl FramePipeline {
    pub fn new(
        detector: Box<dyn MaskDetector>,
        config: &WatchConfig,
        source: EventSource,
        store: Arc<dyn EventStore>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        Self {
            detector,
            tracker: CentroidTracker::new(config.match_distance, config.max_missed_frames),
            gate: CooldownGate::new(config.cooldown(), config.violation_labels.clone()),
            source,
            snapshots_enabled: config.snapshots_enabled,
            store,
            snapshots,
            frame_index: 0,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.gate.cooldown()
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.gate.set_cooldown(cooldown);
    }

    pub fn snapshots_enabled(&self) -> bool {
        self.snapshots_enabled
    }

    pub fn set_snapshots_enabled(&mut self, enabled: bool) {
        self.snapshots_enabled = enabled;
    }

    /// Runs one frame through the chain.
    ///
    /// `now` is this stream's clock: elapsed session time for live frames,
    /// media time for sampled video frames. A detector failure degrades to
    /// an empty result; the tracker still ages its tracks so occlusion
    /// bookkeeping stays consistent.
    pub fn process_frame(&mut self, frame: &Frame, now: Duration) -> FrameReport {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!(
                    "detector failed on {} frame {}: {e}",
                    self.source,
                    self.frame_index
                );
                Vec::new()
            }
        };

        let frame_index = self.frame_index;
        self.frame_index += 1;

        let update = self.tracker.update(&detections, frame_index);
        if !update.evicted.is_empty() {
            log::debug!("evicted {} stale track(s)", update.evicted.len());
            self.gate.evict_tracks(&update.evicted);
        }

        let mut report = FrameReport {
            faces_count: update.tracked.len(),
            ..FrameReport::default()
        };

        for tracked in update.tracked {
            let track_id = tracked.track_id;
            let detection = tracked.detection;
            let alert = self.gate.should_alert(Some(track_id), detection.label, now);

            let mut snapshot_ref = None;
            if alert {
                snapshot_ref = self.save_snapshot(frame, &detection, track_id);
                self.append_event(&detection, Some(track_id), snapshot_ref.clone(), frame_index);
                report.alert = true;
            }

            report.detections.push(AlertedDetection {
                detection,
                track_id: Some(track_id),
                alert,
                snapshot_ref,
            });
        }

        report
    }

    fn save_snapshot(
        &self,
        frame: &Frame,
        detection: &Detection,
        track_id: TrackId,
    ) -> Option<String> {
        if !self.snapshots_enabled {
            return None;
        }
        let store = self.snapshots.as_ref()?;
        let hint = format!("{}_track_{}", self.source, track_id);
        match store.save(frame, &detection.bbox, &hint) {
            Ok(reference) => Some(reference),
            Err(e) => {
                log::warn!("snapshot save failed for track {track_id}: {e}");
                None
            }
        }
    }

    /// Losing one log entry is acceptable; rolling back the already-updated
    /// cooldown state is not, so append failures only warn.
    fn append_event(
        &self,
        detection: &Detection,
        track_id: Option<TrackId>,
        snapshot_ref: Option<String>,
        frame_index: u64,
    ) {
        let meta = match self.source {
            EventSource::Video => json!({
                "frame": frame_index,
                "box": detection.bbox.as_array(),
            }),
            _ => serde_json::Value::Null,
        };
        let event = Event {
            timestamp: chrono::Utc::now(),
            source: self.source,
            label: detection.label,
            confidence: detection.confidence,
            track_id,
            snapshot_ref,
            meta,
        };
        if let Err(e) = self.store.append(event) {
            log::warn!("event append dropped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::{BoundingBox, MaskLabel};
    use crate::events::domain::event_store::{EventQuery, EventStoreError};
    use crate::events::infrastructure::memory_event_store::InMemoryEventStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replays a script of per-frame outcomes.
    struct ScriptedDetector {
        script: HashMap<usize, Result<Vec<Detection>, String>>,
        calls: usize,
    }

    impl ScriptedDetector {
        fn new(script: HashMap<usize, Result<Vec<Detection>, String>>) -> Self {
            Self { script, calls: 0 }
        }
    }

    impl MaskDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            let call = self.calls;
            self.calls += 1;
            match self.script.remove(&call) {
                Some(Ok(detections)) => Ok(detections),
                Some(Err(message)) => Err(message.into()),
                None => Ok(Vec::new()),
            }
        }
    }

    struct FailingStore;

    impl EventStore for FailingStore {
        fn append(&self, _event: Event) -> Result<crate::events::domain::event::EventId, EventStoreError> {
            Err(EventStoreError::Append("disk full".into()))
        }

        fn query(&self, _query: &EventQuery) -> Result<Vec<Event>, EventStoreError> {
            Ok(Vec::new())
        }
    }

    struct RecordingSnapshots {
        saved: Mutex<Vec<String>>,
        fail: bool,
    }

    impl SnapshotStore for RecordingSnapshots {
        fn save(
            &self,
            _frame: &Frame,
            _bbox: &BoundingBox,
            hint: &str,
        ) -> Result<String, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("read-only filesystem".into());
            }
            let reference = format!("captures/{hint}.png");
            self.saved.lock().unwrap().push(reference.clone());
            Ok(reference)
        }
    }

    fn violation_at(cx: f64, cy: f64) -> Detection {
        Detection {
            bbox: BoundingBox::new(cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0),
            label: MaskLabel::NoMask,
            confidence: 0.9,
        }
    }

    fn compliant_at(cx: f64, cy: f64) -> Detection {
        Detection {
            label: MaskLabel::MaskOn,
            ..violation_at(cx, cy)
        }
    }

    fn frame() -> Frame {
        Frame::new(vec![0u8; 64 * 64 * 3], 64, 64, 0)
    }

    fn config() -> WatchConfig {
        WatchConfig::default()
    }

    fn at(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    fn pipeline_with(
        script: HashMap<usize, Result<Vec<Detection>, String>>,
        store: Arc<dyn EventStore>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        config: &WatchConfig,
    ) -> FramePipeline {
        FramePipeline::new(
            Box::new(ScriptedDetector::new(script)),
            config,
            EventSource::Live,
            store,
            snapshots,
        )
    }

    #[test]
    fn test_violation_alerts_and_logs_once_per_cooldown() {
        let store = Arc::new(InMemoryEventStore::new());
        let script = HashMap::from([
            (0, Ok(vec![violation_at(100.0, 100.0)])),
            (1, Ok(vec![violation_at(102.0, 100.0)])),
            (2, Ok(vec![violation_at(104.0, 100.0)])),
        ]);
        let mut pipeline = pipeline_with(script, store.clone(), None, &config());

        let first = pipeline.process_frame(&frame(), at(0));
        assert!(first.alert);
        assert!(first.detections[0].alert);

        // Same track, still cooling down.
        let second = pipeline.process_frame(&frame(), at(5));
        assert!(!second.alert);
        assert!(!second.detections[0].alert);

        let third = pipeline.process_frame(&frame(), at(11));
        assert!(third.alert);

        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_compliant_faces_never_log() {
        let store = Arc::new(InMemoryEventStore::new());
        let script = HashMap::from([(0, Ok(vec![compliant_at(100.0, 100.0)]))]);
        let mut pipeline = pipeline_with(script, store.clone(), None, &config());

        let report = pipeline.process_frame(&frame(), at(0));
        assert_eq!(report.faces_count, 1);
        assert!(!report.alert);
        assert!(store.is_empty());
    }

    #[test]
    fn test_detector_failure_degrades_to_empty_frame() {
        // Spec scenario: adapter fails on one frame mid-session; that frame
        // reports zero detections and the following frames work normally.
        let store = Arc::new(InMemoryEventStore::new());
        let mut script: HashMap<usize, Result<Vec<Detection>, String>> = HashMap::new();
        for i in 0..20usize {
            if i == 6 {
                script.insert(i, Err("inference backend crashed".into()));
            } else {
                script.insert(i, Ok(vec![compliant_at(100.0, 100.0)]));
            }
        }
        let mut pipeline = pipeline_with(script, store, None, &config());

        for i in 0..20usize {
            let report = pipeline.process_frame(&frame(), at(i as u64));
            if i == 6 {
                assert_eq!(report.faces_count, 0);
                assert!(report.detections.is_empty());
            } else {
                assert_eq!(report.faces_count, 1);
            }
        }
    }

    #[test]
    fn test_track_identity_survives_detector_failure() {
        let store = Arc::new(InMemoryEventStore::new());
        let script = HashMap::from([
            (0, Ok(vec![compliant_at(100.0, 100.0)])),
            (1, Err("transient".to_string())),
            (2, Ok(vec![compliant_at(103.0, 101.0)])),
        ]);
        let mut pipeline = pipeline_with(script, store, None, &config());

        let first = pipeline.process_frame(&frame(), at(0));
        let id = first.detections[0].track_id.unwrap();
        pipeline.process_frame(&frame(), at(1));
        let third = pipeline.process_frame(&frame(), at(2));
        assert_eq!(third.detections[0].track_id, Some(id));
    }

    #[test]
    fn test_eviction_clears_gate_records() {
        let store = Arc::new(InMemoryEventStore::new());
        let script = HashMap::from([(0, Ok(vec![violation_at(100.0, 100.0)]))]);
        let mut cfg = config();
        cfg.max_missed_frames = 1;
        let mut pipeline = pipeline_with(script, store.clone(), None, &cfg);

        pipeline.process_frame(&frame(), at(0));
        // Two empty frames exceed the miss budget and evict the track,
        // which must clear its cooldown record too.
        pipeline.process_frame(&frame(), at(1));
        pipeline.process_frame(&frame(), at(2));
        assert_eq!(pipeline.gate.record_count(), 0);
    }

    #[test]
    fn test_snapshot_saved_for_alerts_when_enabled() {
        let store = Arc::new(InMemoryEventStore::new());
        let snapshots = Arc::new(RecordingSnapshots {
            saved: Mutex::new(Vec::new()),
            fail: false,
        });
        let script = HashMap::from([(0, Ok(vec![violation_at(100.0, 100.0)]))]);
        let mut cfg = config();
        cfg.snapshots_enabled = true;
        let mut pipeline = pipeline_with(script, store.clone(), Some(snapshots.clone()), &cfg);

        let report = pipeline.process_frame(&frame(), at(0));
        let reference = report.detections[0].snapshot_ref.clone().unwrap();
        assert!(reference.contains("live_track_"));
        assert_eq!(snapshots.saved.lock().unwrap().len(), 1);

        let events = store.query(&EventQuery::default()).unwrap();
        assert_eq!(events[0].snapshot_ref.as_deref(), Some(reference.as_str()));
    }

    #[test]
    fn test_snapshot_disabled_skips_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let snapshots = Arc::new(RecordingSnapshots {
            saved: Mutex::new(Vec::new()),
            fail: false,
        });
        let script = HashMap::from([(0, Ok(vec![violation_at(100.0, 100.0)]))]);
        let mut pipeline = pipeline_with(script, store, Some(snapshots.clone()), &config());

        let report = pipeline.process_frame(&frame(), at(0));
        assert!(report.detections[0].snapshot_ref.is_none());
        assert!(snapshots.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_failure_still_logs_event() {
        let store = Arc::new(InMemoryEventStore::new());
        let snapshots = Arc::new(RecordingSnapshots {
            saved: Mutex::new(Vec::new()),
            fail: true,
        });
        let script = HashMap::from([(0, Ok(vec![violation_at(100.0, 100.0)]))]);
        let mut cfg = config();
        cfg.snapshots_enabled = true;
        let mut pipeline = pipeline_with(script, store.clone(), Some(snapshots), &cfg);

        let report = pipeline.process_frame(&frame(), at(0));
        assert!(report.alert);
        assert!(report.detections[0].snapshot_ref.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_failure_does_not_abort_alerting() {
        let script = HashMap::from([
            (0, Ok(vec![violation_at(100.0, 100.0)])),
            (1, Ok(vec![violation_at(102.0, 100.0)])),
        ]);
        let mut pipeline = pipeline_with(script, Arc::new(FailingStore), None, &config());

        let first = pipeline.process_frame(&frame(), at(0));
        assert!(first.alert);
        // Cooldown state was committed even though the append dropped.
        let second = pipeline.process_frame(&frame(), at(5));
        assert!(!second.alert);
    }

    #[test]
    fn test_cooldown_update_applies_to_next_frame() {
        let store = Arc::new(InMemoryEventStore::new());
        let script = HashMap::from([
            (0, Ok(vec![violation_at(100.0, 100.0)])),
            (1, Ok(vec![violation_at(102.0, 100.0)])),
        ]);
        let mut pipeline = pipeline_with(script, store, None, &config());

        pipeline.process_frame(&frame(), at(0));
        pipeline.set_cooldown(Duration::from_secs(2));
        let report = pipeline.process_frame(&frame(), at(3));
        assert!(report.alert);
    }
}
