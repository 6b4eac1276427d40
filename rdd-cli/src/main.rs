// Road damage detection command line interface
// Annotates single images or a directory of frames played back as a stream

use anyhow::Context;
use clap::{Parser, Subcommand};
use rdd_eye::frame::{export_png, EXPORT_FILE_NAME};
use rdd_eye::image_mode::ImageDetector;
use rdd_eye::stream::{FrameSource, ResultBatch, StreamCoordinator, ThresholdController};
use rdd_eye::{DetectionError, DetectorCache, Frame, PipelineConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::io::BufRead;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rdd")]
#[command(about = "Road damage detection: cracks and potholes in images and video", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the model weights path
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect damage in one PNG or JPEG image
    Image {
        /// Image to analyse
        #[arg(long, short)]
        input: PathBuf,

        /// Where to write the annotated PNG
        #[arg(long, short, default_value = EXPORT_FILE_NAME)]
        output: PathBuf,

        /// Confidence threshold in [0, 1]
        #[arg(long, short)]
        threshold: Option<f32>,
    },

    /// Play a directory of frames through the live pipeline
    ///
    /// Result batches are printed as JSON lines. While running, type `+` or
    /// `-` to move the threshold by one step, or a number to set it.
    Stream {
        /// Directory of PNG/JPEG frames, processed in file name order
        #[arg(long)]
        frames_dir: PathBuf,

        /// Write annotated frames here
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Initial confidence threshold
        #[arg(long, short)]
        threshold: Option<f32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = cli.model {
        config.model_path = model;
    }

    match cli.command {
        Commands::Image { input, output, threshold } => {
            let threshold = threshold.unwrap_or(config.default_threshold);
            run_image(&config, &input, &output, threshold)?;
        }
        Commands::Stream { frames_dir, output_dir, threshold } => {
            let threshold = threshold.unwrap_or(config.default_threshold);
            run_stream(config, &frames_dir, output_dir, threshold).await?;
        }
    }

    Ok(())
}

fn run_image(config: &PipelineConfig, input: &Path, output: &Path, threshold: f32) -> anyhow::Result<()> {
    let detector = DetectorCache::global().load(config)?;
    let upload = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let report = ImageDetector::new(detector, config).detect_upload(&upload, threshold)?;
    let export = report.export()?;
    std::fs::write(output, &export.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote {} ({})", output.display(), export.mime);

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "threshold": report.threshold,
            "detections": report.detections,
        }))?
    );
    Ok(())
}

/// Frames read from image files in a directory
struct DirectorySource {
    paths: std::vec::IntoIter<PathBuf>,
}

impl DirectorySource {
    fn open(dir: &Path) -> anyhow::Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        info!("Streaming {} frames from {}", paths.len(), dir.display());
        Ok(Self { paths: paths.into_iter() })
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Option<Result<Frame, DetectionError>> {
        let path = self.paths.next()?;
        Some(std::fs::read(&path).map_err(DetectionError::from).and_then(|bytes| Frame::decode(&bytes)))
    }
}

async fn run_stream(
    config: PipelineConfig,
    frames_dir: &Path,
    output_dir: Option<PathBuf>,
    threshold: f32,
) -> anyhow::Result<()> {
    let detector = DetectorCache::global().load(&config)?;
    let controller = Arc::new(ThresholdController::new(threshold));
    let coordinator = Arc::new(StreamCoordinator::new(detector, controller.clone(), &config));
    let mut rx = coordinator.subscribe();

    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let mut source = DirectorySource::open(frames_dir)?;
    let mut producer = {
        let coordinator = coordinator.clone();
        tokio::task::spawn_blocking(move || {
            let mut written = 0u64;
            let mut sink = |frame: Frame| -> Result<(), DetectionError> {
                if let Some(dir) = &output_dir {
                    let path = dir.join(format!("frame_{:06}.png", written));
                    std::fs::write(path, export_png(&frame)?)?;
                }
                written += 1;
                Ok(())
            };
            coordinator.run(&mut source, &mut sink)
        })
    };

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    let stats = loop {
        tokio::select! {
            outcome = &mut producer => break outcome??,
            batch = rx.next_batch(config.result_wait()) => {
                if let Some(batch) = batch {
                    print_batch(&batch)?;
                }
            }
            line = commands.recv(), if stdin_open => match line {
                Some(line) => adjust_threshold(&controller, line.trim(), config.threshold_step),
                None => stdin_open = false,
            },
            _ = signal::ctrl_c() => {
                info!("Interrupted, finishing current frame");
                coordinator.stop();
            }
        }
    };

    if let Some(batch) = rx.try_latest() {
        print_batch(&batch)?;
    }
    info!(
        "Stream finished: {} annotated, {} passed through, {} unreadable",
        stats.frames_annotated, stats.frames_passed_through, stats.source_errors
    );
    Ok(())
}

/// Forward stdin lines from a detached thread so a pending read never holds
/// up runtime shutdown
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

fn adjust_threshold(controller: &ThresholdController, command: &str, step: f32) {
    let requested = match command {
        "+" => controller.get() + step,
        "-" => controller.get() - step,
        "" => return,
        other => match other.parse::<f32>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring threshold command {:?}", other);
                return;
            }
        },
    };

    match controller.set(requested) {
        Ok(applied) => info!("Threshold set to {:.2}", applied),
        Err(e) => warn!("{}", e),
    }
}

fn print_batch(batch: &ResultBatch) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string(&json!({
            "frame": batch.frame_index,
            "threshold": batch.threshold,
            "detections": batch.detections,
        }))?
    );
    Ok(())
}
