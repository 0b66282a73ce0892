use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::alerting::cooldown_gate::CooldownGate;
use crate::annotate::box_annotator::BoxAnnotator;
use crate::detection::domain::detection::MaskLabel;
use crate::detection::domain::mask_detector::MaskDetector;
use crate::events::domain::event::{Event, EventSource};
use crate::events::domain::event_store::EventStore;
use crate::pipeline::frame_pipeline::AlertedDetection;
use crate::shared::config::WatchConfig;
use crate::shared::frame::Frame;
use crate::storage::domain::snapshot_store::SnapshotStore;
use crate::video::domain::image_writer::ImageWriter;
use crate::video::domain::video_reader::VideoReader;

/// Result of analyzing one still image.
#[derive(Clone, Debug)]
pub struct ImageDetectionReport {
    pub detections: Vec<AlertedDetection>,
    pub faces_count: usize,
    pub label_counts: HashMap<MaskLabel, usize>,
}

/// Single-shot image pipeline: read → detect → gate → log → annotate → write.
///
/// There is no tracker on this path; detections carry no identity, so
/// every violation is alert-worthy (nothing to de-duplicate against).
/// Unlike the live loop, a detector failure here surfaces to the caller —
/// there is no session to keep alive.
pub struct DetectImageUseCase {
    reader: Box<dyn VideoReader>,
    image_writer: Box<dyn ImageWriter>,
    detector: Box<dyn MaskDetector>,
    gate: CooldownGate,
    annotator: BoxAnnotator,
    snapshots_enabled: bool,
    store: Arc<dyn EventStore>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl DetectImageUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        image_writer: Box<dyn ImageWriter>,
        detector: Box<dyn MaskDetector>,
        config: &WatchConfig,
        store: Arc<dyn EventStore>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        Self {
            reader,
            image_writer,
            detector,
            gate: CooldownGate::new(config.cooldown(), config.violation_labels.clone()),
            annotator: BoxAnnotator::new(),
            snapshots_enabled: config.snapshots_enabled,
            store,
            snapshots,
        }
    }

    /// Analyzes one image, logging every detection with `source = image`
    /// and writing an annotated copy when `output_path` is given.
    pub fn execute(
        &mut self,
        input_path: &Path,
        output_path: Option<&Path>,
    ) -> Result<ImageDetectionReport, Box<dyn std::error::Error>> {
        self.reader.open(input_path)?;
        let mut frame = self.reader.frames().next().ok_or("No frames in image")??;
        self.reader.close();

        let detections = self.detector.detect(&frame)?;

        let hint = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| format!("image_{s}"))
            .unwrap_or_else(|| "image".to_string());

        let mut report = ImageDetectionReport {
            detections: Vec::with_capacity(detections.len()),
            faces_count: detections.len(),
            label_counts: HashMap::new(),
        };

        for detection in detections {
            *report.label_counts.entry(detection.label).or_insert(0) += 1;
            let alert = self
                .gate
                .should_alert(None, detection.label, Duration::ZERO);

            let mut snapshot_ref = None;
            if alert && self.snapshots_enabled {
                if let Some(snapshots) = &self.snapshots {
                    match snapshots.save(&frame, &detection.bbox, &hint) {
                        Ok(reference) => snapshot_ref = Some(reference),
                        Err(e) => log::warn!("snapshot save failed for {hint}: {e}"),
                    }
                }
            }

            // Uploads log every detection, violation or not; the alert flag
            // marks the violations.
            let event = Event {
                timestamp: chrono::Utc::now(),
                source: EventSource::Image,
                label: detection.label,
                confidence: detection.confidence,
                track_id: None,
                snapshot_ref: snapshot_ref.clone(),
                meta: json!({ "box": detection.bbox.as_array() }),
            };
            if let Err(e) = self.store.append(event) {
                log::warn!("event append dropped: {e}");
            }

            report.detections.push(AlertedDetection {
                detection,
                track_id: None,
                alert,
                snapshot_ref,
            });
        }

        self.annotator.annotate(&mut frame, &report.detections);
        if let Some(output_path) = output_path {
            self.image_writer.write(output_path, &frame)?;
        }

        Ok(report)
    }
}
