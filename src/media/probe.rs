// FFprobe wrapper for video stream properties

use std::path::Path;
use std::process::Command;
use serde::{Deserialize, Serialize};

use crate::error::{LogoTrackError, Result};

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
    format: Option<FFprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FFprobeFormat {
    duration: Option<String>,
}

/// Properties of the first video stream, read once at open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Container frame count; `None` when the container does not report it.
    pub total_frames: Option<u64>,
    pub duration_seconds: Option<f64>,
}

impl VideoInfo {
    /// Frame count, falling back to duration * fps when the container is silent.
    pub fn estimated_total_frames(&self) -> Option<u64> {
        self.total_frames.or_else(|| {
            self.duration_seconds
                .map(|d| (d * self.fps).round().max(0.0) as u64)
        })
    }
}

/// Run ffprobe on a video and extract stream properties.
pub fn probe(path: &Path) -> Result<VideoInfo> {
    if !path.exists() {
        return Err(LogoTrackError::SourceUnavailable(format!(
            "video not found: {}",
            path.display()
        )));
    }

    let output = Command::new(super::ffprobe_path())
        .args([
            "-v", "quiet",
            "-print_format", "json",
            "-select_streams", "v:0",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| LogoTrackError::SourceUnavailable(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(LogoTrackError::SourceUnavailable(format!(
            "ffprobe could not read {}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo> {
    let parsed: FFprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| LogoTrackError::SourceUnavailable(format!("unparseable ffprobe output: {}", e)))?;

    let stream = parsed
        .streams
        .unwrap_or_default()
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| LogoTrackError::SourceUnavailable("no video stream".to_string()))?;

    let fps = parse_frame_rate(stream.r_frame_rate.as_deref())
        .or_else(|| parse_frame_rate(stream.avg_frame_rate.as_deref()))
        .filter(|f| f.is_finite() && *f > 0.0)
        .ok_or_else(|| LogoTrackError::SourceUnavailable("frame rate is zero or unreadable".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(LogoTrackError::SourceUnavailable("video has no dimensions".to_string())),
    };

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|n| *n > 0);

    let duration_seconds = parse_seconds(stream.duration.as_deref())
        .or_else(|| parse_seconds(parsed.format.and_then(|f| f.duration).as_deref()));

    Ok(VideoInfo {
        width,
        height,
        fps,
        total_frames,
        duration_seconds,
    })
}

/// Parse frame rate string like "30000/1001" to f64
fn parse_frame_rate(rate_str: Option<&str>) -> Option<f64> {
    let rate_str = rate_str?;
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.parse().ok()
}

fn parse_seconds(duration_str: Option<&str>) -> Option<f64> {
    duration_str?.parse::<f64>().ok().filter(|d| d.is_finite() && *d >= 0.0)
}
