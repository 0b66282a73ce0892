//! Registry and bounded worker pool for video-analysis jobs.
//!
//! Submission never blocks: jobs enter the registry as `Queued` and wait on
//! an unbounded channel, but only `pool_size` workers pull from it, so at
//! most that many jobs are `Processing` at once. The registry is in-memory
//! for the lifetime of the process; a restart loses job history, which is
//! an accepted limitation of the single-instance deployment model.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::jobs::video_job::{JobId, JobStatus, JobSummary, VideoJob};

/// What a worker needs to execute one job.
#[derive(Clone, Debug)]
pub struct JobRequest {
    pub job_id: JobId,
    pub input: PathBuf,
}

pub enum JobOutcome {
    Completed {
        summary: JobSummary,
        output_ref: String,
    },
    /// The runner observed the cancellation flag at a frame boundary.
    Cancelled,
}

/// Execution strategy for one job.
///
/// Separated from the manager so the queue/state machine is testable
/// without decoding real video. `progress` reports 0-99 percentages;
/// `cancelled` must be checked at every sampled-frame boundary.
pub trait JobRunner: Send + Sync {
    fn run(
        &self,
        request: &JobRequest,
        progress: &dyn Fn(u8),
        cancelled: &AtomicBool,
    ) -> Result<JobOutcome, Box<dyn std::error::Error>>;
}

struct JobEntry {
    job: VideoJob,
    input: PathBuf,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct Registry {
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl Registry {
    /// A panicked worker must not take the whole registry down; recover
    /// the map from a poisoned lock and keep serving status polls.
    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, job_id: JobId, input: PathBuf) {
        self.lock().insert(
            job_id,
            JobEntry {
                job: VideoJob::queued(job_id),
                input,
                cancel: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    fn snapshot(&self, job_id: &JobId) -> Option<VideoJob> {
        self.lock().get(job_id).map(|entry| entry.job.clone())
    }

    /// Claims a queued job for execution. Returns `None` when the job was
    /// cancelled (or otherwise left `Queued`) before a worker reached it.
    fn begin(&self, job_id: JobId) -> Option<(PathBuf, Arc<AtomicBool>)> {
        let mut jobs = self.lock();
        let entry = jobs.get_mut(&job_id)?;
        if entry.job.status != JobStatus::Queued {
            return None;
        }
        entry.job.status = JobStatus::Processing;
        Some((entry.input.clone(), entry.cancel.clone()))
    }

    /// Progress only moves forward and never shows 100 before completion.
    fn set_progress(&self, job_id: JobId, progress: u8) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(&job_id) {
            if entry.job.status == JobStatus::Processing {
                let clamped = progress.min(99);
                if clamped > entry.job.progress {
                    entry.job.progress = clamped;
                }
            }
        }
    }

    fn complete(&self, job_id: JobId, summary: JobSummary, output_ref: String) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(&job_id) {
            entry.job.status = JobStatus::Completed;
            entry.job.progress = 100;
            entry.job.summary = Some(summary);
            entry.job.output_ref = Some(output_ref);
            entry.job.completed_at = Some(chrono::Utc::now());
        }
    }

    /// Partial progress is kept for diagnostics.
    fn fail(&self, job_id: JobId, error: String) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(&job_id) {
            entry.job.status = JobStatus::Failed;
            entry.job.error = Some(error);
            entry.job.completed_at = Some(chrono::Utc::now());
        }
    }

    fn mark_cancelled(&self, job_id: JobId) {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(&job_id) {
            entry.job.status = JobStatus::Cancelled;
            entry.job.completed_at = Some(chrono::Utc::now());
        }
    }

    fn request_cancel(&self, job_id: &JobId) -> bool {
        let mut jobs = self.lock();
        let Some(entry) = jobs.get_mut(job_id) else {
            return false;
        };
        match entry.job.status {
            JobStatus::Queued => {
                entry.job.status = JobStatus::Cancelled;
                entry.job.completed_at = Some(chrono::Utc::now());
                true
            }
            JobStatus::Processing => {
                entry.cancel.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }
}

pub struct VideoJobManager {
    registry: Arc<Registry>,
    queue: Option<crossbeam_channel::Sender<JobId>>,
    workers: Vec<JoinHandle<()>>,
}

impl VideoJobManager {
    pub fn new(runner: Arc<dyn JobRunner>, pool_size: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<JobId>();
        let registry = Arc::new(Registry::default());

        let workers = (0..pool_size.max(1))
            .map(|_| {
                let rx = rx.clone();
                let registry = registry.clone();
                let runner = runner.clone();
                std::thread::spawn(move || {
                    for job_id in rx.iter() {
                        run_one(&registry, runner.as_ref(), job_id);
                    }
                })
            })
            .collect();

        Self {
            registry,
            queue: Some(tx),
            workers,
        }
    }

    /// Registers a job and schedules it. Returns immediately; when the pool
    /// is saturated the job simply stays `Queued` until a worker frees up.
    pub fn submit(&self, input: PathBuf) -> JobId {
        let job_id = JobId::new();
        self.registry.insert(job_id, input);
        if let Some(queue) = &self.queue {
            // The receivers outlive the sender, so this cannot fail here.
            let _ = queue.send(job_id);
        }
        log::info!("video job {job_id} queued");
        job_id
    }

    pub fn get_status(&self, job_id: &JobId) -> Option<VideoJob> {
        self.registry.snapshot(job_id)
    }

    /// Cancels a queued or processing job. Queued jobs flip to `Cancelled`
    /// immediately; processing jobs stop cooperatively at the next sampled
    /// frame boundary. Returns false for unknown or already-terminal jobs.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        let accepted = self.registry.request_cancel(job_id);
        if accepted {
            log::info!("video job {job_id} cancel requested");
        }
        accepted
    }
}

impl Drop for VideoJobManager {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit; busy ones finish
        // their current job first.
        self.queue.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn run_one(registry: &Registry, runner: &dyn JobRunner, job_id: JobId) {
    let Some((input, cancel)) = registry.begin(job_id) else {
        return;
    };
    log::info!("video job {job_id} processing");

    let request = JobRequest { job_id, input };
    let progress = |p: u8| registry.set_progress(job_id, p);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        runner.run(&request, &progress, &cancel)
    }));

    match outcome {
        Ok(Ok(JobOutcome::Completed {
            summary,
            output_ref,
        })) => {
            registry.complete(job_id, summary, output_ref);
            log::info!("video job {job_id} completed");
        }
        Ok(Ok(JobOutcome::Cancelled)) => {
            registry.mark_cancelled(job_id);
            log::info!("video job {job_id} cancelled");
        }
        Ok(Err(e)) => {
            log::warn!("video job {job_id} failed: {e}");
            registry.fail(job_id, e.to_string());
        }
        Err(_) => {
            log::warn!("video job {job_id} runner panicked");
            registry.fail(job_id, "job runner panicked".to_string());
        }
    }
}
