// LogoTrack CLI binary

use std::path::{Path, PathBuf};
use clap::{Parser, Subcommand};
use anyhow::Result;

use logotrack_lib::commands::{self, DetectionQuery};
use logotrack_lib::config::{PipelineConfig, StoreConfig, ThresholdMode};
use logotrack_lib::constants::CONFIG_FILENAME;
use logotrack_lib::db::DetectionStore;
use logotrack_lib::detector::{Detector, ReplayDetector};
use logotrack_lib::media::{self, FfmpegOpener};
use logotrack_lib::pipeline::Pipeline;
use logotrack_lib::thresholds::ThresholdMap;

#[derive(Parser)]
#[command(name = "logotrack")]
#[command(about = "LogoTrack - Brand logo detection and screen-time statistics", long_about = None)]
#[command(version)]
struct Cli {
    /// Store directory (detections.db + images/). Defaults to the per-user data dir.
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store (database and evidence directory)
    Init,

    /// Detect logos in a video, or in every video under a directory
    Process {
        /// Video file or directory
        path: PathBuf,
        /// Per-brand threshold, e.g. --threshold adidas=0.6 (repeatable)
        #[arg(short, long = "threshold", value_name = "BRAND=VALUE")]
        thresholds: Vec<String>,
        /// One threshold for every --brand
        #[arg(long, value_name = "VALUE")]
        global_threshold: Option<f64>,
        /// Brand used with --global-threshold (repeatable)
        #[arg(long = "brand", value_name = "BRAND")]
        brands: Vec<String>,
        /// Analyse every Nth frame
        #[arg(long, value_name = "N")]
        sample_every: Option<u64>,
        /// Do not write evidence crops
        #[arg(long)]
        no_evidence: bool,
        /// JSON config file (defaults to <store>/logotrack.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Detections exported by an external model run (JSON)
        #[arg(long, conflicts_with = "model")]
        replay: Option<PathBuf>,
        /// YOLOv8 ONNX model (requires the `onnx` feature)
        #[arg(long, requires = "labels")]
        model: Option<PathBuf>,
        /// Class names for --model, one per line
        #[arg(long)]
        labels: Option<PathBuf>,
    },

    /// List stored detections
    List {
        /// Substring of the video name
        #[arg(long)]
        video: Option<String>,
        /// Exact brand
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        min_confidence: Option<f64>,
        #[arg(long)]
        frame_start: Option<i64>,
        #[arg(long)]
        frame_end: Option<i64>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete a detection and its evidence image
    Delete {
        /// Row identifier
        rowid: i64,
    },

    /// Show stored analysis runs
    Analyses {
        /// Exact video name
        #[arg(long)]
        video: Option<String>,
        /// Maximum runs to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Brand appearances over time for one video
    Timeline {
        video_name: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let store_root = resolve_store_root(cli.store)?;
    let store = StoreConfig::under(&store_root);

    match cli.command {
        Commands::Init => cmd_init(&store),
        Commands::Process {
            path,
            thresholds,
            global_threshold,
            brands,
            sample_every,
            no_evidence,
            config,
            replay,
            model,
            labels,
        } => {
            let config_path = config.or_else(|| {
                let default = store_root.join(CONFIG_FILENAME);
                default.exists().then_some(default)
            });
            let mut pipeline_config = match config_path {
                Some(p) => PipelineConfig::load(&p, store.clone())?,
                None => PipelineConfig::new(store.clone()),
            };
            // The store the other subcommands read is the one results go to
            pipeline_config.store = store;
            apply_threshold_flags(&mut pipeline_config, &thresholds, global_threshold, brands)?;
            if let Some(n) = sample_every {
                pipeline_config.sample_every_n_frames = n;
            }
            if no_evidence {
                pipeline_config.save_evidence = false;
            }

            let detector = build_detector(replay, model, labels)?;
            cmd_process(&path, pipeline_config, detector)
        }
        Commands::List { video, brand, min_confidence, frame_start, frame_end, json } => {
            let query = DetectionQuery { video_name: video, brand, min_confidence, frame_start, frame_end };
            cmd_list(&store, query, json)
        }
        Commands::Delete { rowid } => cmd_delete(&store, rowid),
        Commands::Analyses { video, limit } => cmd_analyses(&store, video, limit),
        Commands::Timeline { video_name } => cmd_timeline(&store, &video_name),
    }
}

fn cmd_init(store: &StoreConfig) -> Result<()> {
    let db = DetectionStore::open(store)?;

    println!("Initialized store:");
    println!("  {}  - Database ({} detections)", store.db_path.display(), db.count_detections()?);
    println!("  {}  - Evidence images", store.evidence_dir.display());

    Ok(())
}

fn cmd_process(path: &Path, config: PipelineConfig, detector: Box<dyn Detector>) -> Result<()> {
    let videos = media::discover_videos(path)?;
    if videos.is_empty() {
        anyhow::bail!("No video files found in {}", path.display());
    }

    if !media::ffmpeg_available() {
        anyhow::bail!("ffmpeg/ffprobe not found. Install FFmpeg or set LOGOTRACK_FFMPEG_PATH and LOGOTRACK_FFPROBE_PATH");
    }

    let thresholds = config.thresholds.resolve();
    let mut pipeline = Pipeline::new(config, detector, Box::new(FfmpegOpener))?;

    let mut failed = 0usize;
    for video in &videos {
        match pipeline.process(video, &thresholds) {
            Ok(stats) => {
                println!("{}", stats.render_report());
            }
            Err(e) => {
                failed += 1;
                eprintln!("Failed to process {}: {}", video.display(), e);
            }
        }
    }

    if videos.len() > 1 {
        println!("Processed {} of {} videos", videos.len() - failed, videos.len());
    }
    if failed > 0 {
        anyhow::bail!("{} video(s) failed", failed);
    }

    Ok(())
}

fn cmd_list(store: &StoreConfig, query: DetectionQuery, json: bool) -> Result<()> {
    let rows = commands::list_detections(store, query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No detections found. Use 'logotrack process <video>' to analyse footage.");
        return Ok(());
    }

    println!("{:>6}  {:>8}  {:>7}  {:>10}  {:>5}  {:<24}  {}", "ID", "Time", "Frame", "Brand", "Conf", "Video", "Evidence");
    println!("{}", "-".repeat(90));

    for row in &rows {
        println!("{:>6}  {:>8}  {:>7}  {:>10}  {:>5.2}  {:<24}  {}",
            row.rowid,
            format_timestamp(row.timestamp),
            row.frame_number,
            row.brand,
            row.confidence,
            truncate(&row.video_name, 24),
            row.image_path.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("{} detection(s)", rows.len());

    Ok(())
}

fn cmd_delete(store: &StoreConfig, rowid: i64) -> Result<()> {
    match commands::delete_detection(store, rowid) {
        Ok(response) => {
            println!("{}", response.message);
            Ok(())
        }
        Err(e) if e.is_not_found() => anyhow::bail!("Detection {} not found", rowid),
        Err(e) => Err(e.into()),
    }
}

fn cmd_analyses(store: &StoreConfig, video: Option<String>, limit: u32) -> Result<()> {
    let analyses = commands::list_analyses(store, video.as_deref(), Some(limit))?;

    if analyses.is_empty() {
        println!("No analyses stored.");
        return Ok(());
    }

    for analysis in &analyses {
        match analysis.summary() {
            Some(stats) => {
                println!("[{}] {}", analysis.analysis_date, analysis.video_name);
                print!("{}", stats.render_report());
            }
            None => {
                println!("[{}] {} ({} frames, {:.2}s)",
                    analysis.analysis_date,
                    analysis.video_name,
                    analysis.total_frames,
                    analysis.duration_seconds
                );
                println!("  summary: {}", analysis.detection_summary);
            }
        }
        println!();
    }

    Ok(())
}

fn cmd_timeline(store: &StoreConfig, video_name: &str) -> Result<()> {
    let points = commands::brand_timeline(store, video_name)?;

    if points.is_empty() {
        println!("No detections for {}", video_name);
        return Ok(());
    }

    println!("{:>8}  {:>10}  {}", "Time", "Brand", "Confidence");
    for point in &points {
        println!("{:>8}  {:>10}  {:.2}", format_timestamp(point.timestamp), point.brand, point.confidence);
    }

    Ok(())
}

// --- Helper Functions ---

fn resolve_store_root(store: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = store {
        return Ok(path);
    }

    directories::ProjectDirs::from("", "", "logotrack")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory; pass --store"))
}

/// CLI threshold flags override whatever the config file selected.
fn apply_threshold_flags(
    config: &mut PipelineConfig,
    assignments: &[String],
    global_threshold: Option<f64>,
    brands: Vec<String>,
) -> Result<()> {
    if let Some(threshold) = global_threshold {
        if !assignments.is_empty() {
            anyhow::bail!("--threshold and --global-threshold cannot be combined");
        }
        let brands = if brands.is_empty() {
            config.thresholds.resolve().brands().map(|b| b.to_string()).collect()
        } else {
            brands
        };
        config.thresholds = ThresholdMode::Global { threshold, brands };
    } else if !assignments.is_empty() {
        let mut map = ThresholdMap::new();
        for assignment in assignments {
            let (brand, value) = ThresholdMap::parse_assignment(assignment)?;
            map.insert(brand, value);
        }
        config.thresholds = ThresholdMode::PerBrand { thresholds: map };
    } else if !brands.is_empty() {
        anyhow::bail!("--brand requires --global-threshold");
    }

    config.validate()?;
    Ok(())
}

fn build_detector(replay: Option<PathBuf>, model: Option<PathBuf>, labels: Option<PathBuf>) -> Result<Box<dyn Detector>> {
    if let Some(path) = replay {
        let detector = ReplayDetector::load(&path)?;
        log::info!("Replaying {} frames of detections from {}", detector.frame_count(), path.display());
        return Ok(Box::new(detector));
    }

    match (model, labels) {
        (Some(model), Some(labels)) => build_model_detector(model, labels),
        _ => anyhow::bail!("No detector given: pass --replay FILE or --model FILE --labels FILE"),
    }
}

#[cfg(feature = "onnx")]
fn build_model_detector(model: PathBuf, labels: PathBuf) -> Result<Box<dyn Detector>> {
    use logotrack_lib::detector::{YoloConfig, YoloDetector};
    Ok(Box::new(YoloDetector::new(YoloConfig::new(model, labels))?))
}

#[cfg(not(feature = "onnx"))]
fn build_model_detector(model: PathBuf, _labels: PathBuf) -> Result<Box<dyn Detector>> {
    anyhow::bail!(
        "Cannot load {}: logotrack was built without the `onnx` feature",
        model.display()
    )
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0);
    let minutes = (total / 60.0).floor() as u64;
    let secs = total - minutes as f64 * 60.0;
    format!("{}:{:05.2}", minutes, secs)
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() > max {
        let head: String = value.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}
