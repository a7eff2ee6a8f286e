// Video input: probing and frame decoding

pub mod probe;
pub mod source;

pub use probe::VideoInfo;
pub use source::{Frame, FrameSource, VideoOpener, FfmpegOpener, FfmpegFrameSource};

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::constants::{FFMPEG_PATH_ENV, FFPROBE_PATH_ENV, VIDEO_EXTENSIONS};
use crate::error::{LogoTrackError, Result};

/// Program to run for a tool: the env override when set, else the bare name
/// for a PATH lookup.
fn tool_command(env_key: &str, name: &str) -> PathBuf {
    std::env::var_os(env_key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(name))
}

pub fn ffmpeg_path() -> PathBuf {
    tool_command(FFMPEG_PATH_ENV, "ffmpeg")
}

pub fn ffprobe_path() -> PathBuf {
    tool_command(FFPROBE_PATH_ENV, "ffprobe")
}

/// Whether `program -version` runs and exits cleanly.
pub fn tool_runs(program: &Path) -> bool {
    std::process::Command::new(program)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Both ffprobe and ffmpeg can be run.
pub fn ffmpeg_available() -> bool {
    tool_runs(&ffprobe_path()) && tool_runs(&ffmpeg_path())
}

/// Video name recorded with each detection: the file name of the source.
pub fn video_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Whether a path has a recognised video extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Videos to process for a path: the file itself, or every video under a
/// directory in sorted order.
pub fn discover_videos(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(LogoTrackError::SourceUnavailable(format!(
            "path not found: {}",
            path.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_video_file(p))
        .collect();

    files.sort();
    Ok(files)
}
