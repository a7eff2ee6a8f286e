// LogoTrack Constants
// Storage layout and column names are a contract with the dashboard. Do not change casually.

// Store layout
pub const DB_FILENAME: &str = "detections.db";
pub const EVIDENCE_FOLDER: &str = "images";

// Tables
pub const DETECTIONS_TABLE: &str = "detections";
pub const ANALYSIS_TABLE: &str = "video_analysis";
pub const DETECTIONS_BACKUP_PREFIX: &str = "detections_backup_";

/// The detections table holds exactly these columns, in this order.
pub const DETECTION_COLUMNS: [&str; 7] = [
    "video_name",
    "frame_number",
    "brand",
    "confidence",
    "bbox",
    "timestamp",
    "image_path",
];

// Thresholds
pub const DEFAULT_BRANDS: [&str; 3] = ["adidas", "nike", "puma"];
pub const DEFAULT_BRAND_THRESHOLD: f32 = 0.50;

// Sampling
pub const DEFAULT_SAMPLE_EVERY_N_FRAMES: u64 = 1;

// Progress reporting cadence (frames)
pub const PROGRESS_LOG_INTERVAL: u64 = 100;

// Evidence images
pub const EVIDENCE_EXTENSION: &str = "jpg";
pub const EVIDENCE_QUALITY: u8 = 90;
pub const TEMP_FILE_PREFIX: &str = ".logotrack_tmp_";

// YOLO defaults (onnx feature)
pub const YOLO_INPUT_SIZE: u32 = 640;
pub const YOLO_NMS_THRESHOLD: f32 = 0.45;

// Config file
pub const CONFIG_FILENAME: &str = "logotrack.json";

// Tool overrides; unset means a PATH lookup
pub const FFMPEG_PATH_ENV: &str = "LOGOTRACK_FFMPEG_PATH";
pub const FFPROBE_PATH_ENV: &str = "LOGOTRACK_FFPROBE_PATH";

// Video extensions accepted when processing a directory
pub const VIDEO_EXTENSIONS: [&str; 14] = [
    "mp4", "mov", "avi", "mkv", "mts", "m2ts", "mpg", "mpeg",
    "wmv", "flv", "webm", "3gp", "m4v", "ts",
];
