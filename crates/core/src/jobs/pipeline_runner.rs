//! Production job execution: decode → sample → detect/track/gate →
//! annotate → encode, with cooperative cancellation at sampled-frame
//! boundaries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::annotate::box_annotator::BoxAnnotator;
use crate::detection::domain::detection::MaskLabel;
use crate::detection::domain::mask_detector::MaskDetector;
use crate::events::domain::event::EventSource;
use crate::events::domain::event_store::EventStore;
use crate::jobs::manager::{JobOutcome, JobRequest, JobRunner};
use crate::jobs::video_job::JobSummary;
use crate::pipeline::frame_pipeline::FramePipeline;
use crate::shared::config::WatchConfig;
use crate::shared::video_metadata::VideoMetadata;
use crate::storage::domain::snapshot_store::SnapshotStore;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;
use crate::video::infrastructure::ffmpeg_reader::FfmpegReader;
use crate::video::infrastructure::ffmpeg_writer::FfmpegWriter;

pub type DetectorFactory = Box<dyn Fn() -> Box<dyn MaskDetector> + Send + Sync>;
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn VideoReader> + Send + Sync>;
pub type WriterFactory = Box<dyn Fn() -> Box<dyn VideoWriter> + Send + Sync>;

/// Runs each job through one `FramePipeline` of its own, so tracking
/// identities and cooldown state never leak between jobs. The gate runs on
/// media time (sampled-frame timestamps), not wall-clock: a 10s cooldown
/// means 10 seconds of footage.
pub struct PipelineJobRunner {
    config: WatchConfig,
    store: Arc<dyn EventStore>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    detectors: DetectorFactory,
    readers: ReaderFactory,
    writers: WriterFactory,
    annotator: BoxAnnotator,
}

impl PipelineJobRunner {
    pub fn new(
        config: WatchConfig,
        store: Arc<dyn EventStore>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        detectors: DetectorFactory,
    ) -> Self {
        Self::with_io(
            config,
            store,
            snapshots,
            detectors,
            Box::new(|| Box::new(FfmpegReader::new())),
            Box::new(|| Box::new(FfmpegWriter::new())),
        )
    }

    /// Full dependency injection, used by tests and alternative codecs.
    pub fn with_io(
        config: WatchConfig,
        store: Arc<dyn EventStore>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        detectors: DetectorFactory,
        readers: ReaderFactory,
        writers: WriterFactory,
    ) -> Self {
        Self {
            config,
            store,
            snapshots,
            detectors,
            readers,
            writers,
            annotator: BoxAnnotator::new(),
        }
    }

    fn output_path(&self, request: &JobRequest) -> PathBuf {
        let stem = request
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        let id = Uuid::new_v4().simple().to_string();
        self.config
            .outputs_dir
            .join(format!("annotated_{stem}_{}.mp4", &id[..8]))
    }
}

impl JobRunner for PipelineJobRunner {
    fn run(
        &self,
        request: &JobRequest,
        progress: &dyn Fn(u8),
        cancelled: &AtomicBool,
    ) -> Result<JobOutcome, Box<dyn std::error::Error>> {
        let mut reader = (self.readers)();
        let metadata = reader.open(&request.input)?;

        let fps = if metadata.fps > 0.0 {
            metadata.fps
        } else {
            self.config.sample_fps
        };
        let step = ((fps / self.config.sample_fps).round() as usize).max(1);
        let total_sampled = if metadata.total_frames > 0 {
            (metadata.total_frames + step - 1) / step
        } else {
            0
        };

        std::fs::create_dir_all(&self.config.outputs_dir)?;
        let output_path = self.output_path(request);
        let mut writer = (self.writers)();
        writer.open(
            &output_path,
            &VideoMetadata {
                width: metadata.width,
                height: metadata.height,
                fps: fps / step as f64,
                total_frames: total_sampled,
                codec: String::new(),
                source_path: Some(request.input.clone()),
            },
        )?;

        let mut pipeline = FramePipeline::new(
            (self.detectors)(),
            &self.config,
            EventSource::Video,
            self.store.clone(),
            self.snapshots.clone(),
        );

        let mut label_counts: HashMap<MaskLabel, usize> = HashMap::new();
        let mut total_alerts = 0usize;
        let mut processed = 0usize;

        let mut was_cancelled = false;
        for frame_result in reader.frames() {
            let mut frame = frame_result?;
            if frame.index() % step != 0 {
                continue;
            }

            // Cancellation checkpoint: between sampled frames, never mid-frame.
            if cancelled.load(Ordering::Relaxed) {
                was_cancelled = true;
                break;
            }

            let media_time = Duration::from_secs_f64(frame.index() as f64 / fps);
            let report = pipeline.process_frame(&frame, media_time);

            for det in &report.detections {
                *label_counts.entry(det.detection.label).or_insert(0) += 1;
                if det.alert {
                    total_alerts += 1;
                }
            }

            self.annotator.annotate(&mut frame, &report.detections);
            writer.write(&frame)?;
            processed += 1;

            if total_sampled > 0 {
                progress((processed * 100 / total_sampled).min(99) as u8);
            }
        }

        if was_cancelled {
            reader.close();
            let _ = writer.close();
            return Ok(JobOutcome::Cancelled);
        }

        reader.close();
        writer.close()?;

        let total_frames = if total_sampled > 0 {
            total_sampled
        } else {
            processed
        };
        Ok(JobOutcome::Completed {
            summary: JobSummary {
                total_frames,
                processed_frames: processed,
                label_counts,
                total_alerts,
            },
            output_ref: output_path.display().to_string(),
        })
    }
}
