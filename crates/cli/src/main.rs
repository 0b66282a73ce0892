use std::io::BufReader;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use maskwatch_core::detection::domain::detection::MaskLabel;
use maskwatch_core::detection::domain::mask_detector::MaskDetector;
use maskwatch_core::detection::infrastructure::heuristic_detector::HeuristicDetector;
use maskwatch_core::detection::infrastructure::shared_detector::SharedDetector;
use maskwatch_core::events::domain::csv::export_csv;
use maskwatch_core::events::domain::event::EventSource;
use maskwatch_core::events::domain::event_store::{EventQuery, EventStore};
use maskwatch_core::events::infrastructure::memory_event_store::InMemoryEventStore;
use maskwatch_core::jobs::manager::VideoJobManager;
use maskwatch_core::jobs::pipeline_runner::PipelineJobRunner;
use maskwatch_core::jobs::video_job::JobStatus;
use maskwatch_core::pipeline::detect_image_use_case::DetectImageUseCase;
use maskwatch_core::session::coordinator::SessionCoordinator;
use maskwatch_core::session::protocol::DetectionPayload;
use maskwatch_core::session::transport::JsonLinesTransport;
use maskwatch_core::shared::config::WatchConfig;
use maskwatch_core::shared::constants::IMAGE_EXTENSIONS;
use maskwatch_core::storage::domain::snapshot_store::SnapshotStore;
use maskwatch_core::storage::infrastructure::file_snapshot_store::FileSnapshotStore;
use maskwatch_core::video::infrastructure::image_file_reader::ImageFileReader;
use maskwatch_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// Mask-compliance monitoring: live detection sessions, video analysis
/// jobs, and event export.
#[derive(Parser)]
#[command(name = "maskwatch")]
struct Cli {
    /// JSON config file; missing fields fall back to defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve live detection sessions over TCP (one JSON message per line).
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8765")]
        listen: String,
    },
    /// Analyze a video as a background job and wait for it to finish.
    Video {
        input: PathBuf,

        /// Seconds between status polls.
        #[arg(long, default_value = "1")]
        poll_seconds: u64,

        /// Write this run's video events as CSV to the given file.
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },
    /// Analyze a single image.
    Image {
        input: PathBuf,

        /// Annotated output image path.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write this run's image events as CSV to the given file.
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = WatchConfig::load(cli.config.as_deref());

    match cli.command {
        Command::Serve { listen } => serve(&listen, &config),
        Command::Video {
            input,
            poll_seconds,
            export_csv,
        } => run_video_job(&input, poll_seconds, export_csv.as_deref(), &config),
        Command::Image {
            input,
            output,
            export_csv,
        } => run_image(&input, output.as_deref(), export_csv.as_deref(), &config),
    }
}

/// One detector instance is shared by all sessions behind a mutex, the way
/// a single loaded model would be; every session still gets its own
/// tracker and cooldown gate.
fn serve(listen: &str, config: &WatchConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::new(config.captures_dir.clone()));
    let detector = SharedDetector::new(Box::new(HeuristicDetector::new()));

    let listener = TcpListener::bind(listen)?;
    log::info!("listening on {listen}");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };

        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let config = config.clone();
        let store = store.clone();
        let snapshots = snapshots.clone();
        let detector: Box<dyn MaskDetector> = Box::new(detector.clone());

        std::thread::spawn(move || {
            log::info!("session {peer} connected");
            let reader = match stream.try_clone() {
                Ok(read_half) => BufReader::new(read_half),
                Err(e) => {
                    log::warn!("session {peer} setup failed: {e}");
                    return;
                }
            };
            let mut transport = JsonLinesTransport::new(reader, stream);
            let mut session = SessionCoordinator::new(detector, &config, store, Some(snapshots));
            match session.run(&mut transport) {
                Ok(()) => log::info!("session {peer} closed"),
                Err(e) => log::warn!("session {peer} dropped: {e}"),
            }
        });
    }

    Ok(())
}

fn run_video_job(
    input: &std::path::Path,
    poll_seconds: u64,
    export: Option<&std::path::Path>,
    config: &WatchConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::new(config.captures_dir.clone()));

    let runner = Arc::new(PipelineJobRunner::new(
        config.clone(),
        store.clone(),
        Some(snapshots),
        Box::new(|| Box::new(HeuristicDetector::new())),
    ));
    let manager = VideoJobManager::new(runner, config.job_workers);

    let job_id = manager.submit(input.to_path_buf());
    let mut last_progress = 0u8;

    let job = loop {
        let job = manager
            .get_status(&job_id)
            .ok_or("job vanished from registry")?;
        if job.progress > last_progress {
            log::info!("progress: {}%", job.progress);
            last_progress = job.progress;
        }
        if job.status.is_terminal() {
            break job;
        }
        std::thread::sleep(Duration::from_secs(poll_seconds.max(1)));
    };

    match job.status {
        JobStatus::Completed => {
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        JobStatus::Failed => {
            return Err(job.error.unwrap_or_else(|| "job failed".to_string()).into());
        }
        JobStatus::Cancelled => return Err("job was cancelled".into()),
        _ => unreachable!("terminal status expected"),
    }

    if let Some(path) = export {
        write_events_csv(store.as_ref(), EventSource::Video, path)?;
    }
    Ok(())
}

fn is_image(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn run_image(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    export: Option<&std::path::Path>,
    config: &WatchConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if !is_image(input) {
        return Err(format!("not a supported image type: {}", input.display()).into());
    }

    let store = Arc::new(InMemoryEventStore::new());
    let snapshots: Arc<dyn SnapshotStore> =
        Arc::new(FileSnapshotStore::new(config.captures_dir.clone()));

    let mut use_case = DetectImageUseCase::new(
        Box::new(ImageFileReader::new()),
        Box::new(ImageFileWriter::new()),
        Box::new(HeuristicDetector::new()),
        config,
        store.clone(),
        Some(snapshots),
    );

    let report = use_case.execute(input, output)?;

    let label_counts: std::collections::HashMap<MaskLabel, usize> = report.label_counts;
    let detections: Vec<DetectionPayload> =
        report.detections.iter().map(DetectionPayload::from).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "faces_count": report.faces_count,
            "label_counts": label_counts,
            "detections": detections,
            "annotated_image": output.map(|p| p.display().to_string()),
        }))?
    );

    if let Some(path) = export {
        write_events_csv(store.as_ref(), EventSource::Image, path)?;
    }
    Ok(())
}

fn write_events_csv(
    store: &dyn EventStore,
    source: EventSource,
    path: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = store.query(&EventQuery {
        source: Some(source),
        ..EventQuery::default()
    })?;
    std::fs::write(path, export_csv(&events))?;
    log::info!("wrote {} event(s) to {}", events.len(), path.display());
    Ok(())
}
