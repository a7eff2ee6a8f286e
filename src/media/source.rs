// Frame source: decodes a video into ordered RGB frames.
//
// ffmpeg is spawned with rawvideo/rgb24 output on stdout. The child process is
// killed and reaped on exhaustion, on drop (early termination) and on error.

use std::path::Path;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use image::RgbImage;

use crate::error::{LogoTrackError, Result};
use super::probe::{self, VideoInfo};

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based, monotonic within a run.
    pub index: u64,
    /// `index / fps`, in seconds.
    pub timestamp: f64,
    pub image: RgbImage,
}

/// A finite, non-restartable sequence of frames.
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release underlying resources. Called on every exit path; must be idempotent.
    fn close(&mut self) {}
}

/// Opens video files as frame sources.
pub trait VideoOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

/// Frame timestamp in seconds for a zero-based index.
pub fn frame_timestamp(index: u64, fps: f64) -> f64 {
    index as f64 / fps
}

/// Opens videos through ffprobe + ffmpeg.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameSource::open(path)?))
    }
}

pub struct FfmpegFrameSource {
    info: VideoInfo,
    child: Option<FfmpegChild>,
    events: Option<FfmpegIterator>,
    next_index: u64,
}

impl FfmpegFrameSource {
    pub fn open(path: &Path) -> Result<Self> {
        let info = probe::probe(path)?;

        let mut child = FfmpegCommand::new_with_path(super::ffmpeg_path())
            .input(path)
            .args(["-an", "-sn"])
            .rawvideo()
            .spawn()
            .map_err(|e| LogoTrackError::SourceUnavailable(format!("failed to spawn ffmpeg: {}", e)))?;

        let events = match child.iter() {
            Ok(events) => events,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LogoTrackError::SourceUnavailable(format!(
                    "failed to read ffmpeg output: {}",
                    e
                )));
            }
        };

        log::debug!(
            "Opened {} ({}x{} @ {:.3} fps, {:?} frames)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.total_frames
        );

        Ok(Self {
            info,
            child: Some(child),
            events: Some(events),
            next_index: 0,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(events) = self.events.as_mut() else {
                return Ok(None);
            };

            match events.next() {
                None | Some(FfmpegEvent::Done) => {
                    self.close();
                    return Ok(None);
                }
                Some(FfmpegEvent::OutputFrame(raw)) => {
                    let (width, height) = (raw.width, raw.height);
                    let Some(image) = RgbImage::from_raw(width, height, raw.data) else {
                        self.close();
                        return Err(LogoTrackError::SourceUnavailable(format!(
                            "truncated frame {} ({}x{})",
                            self.next_index, width, height
                        )));
                    };

                    let index = self.next_index;
                    self.next_index += 1;

                    return Ok(Some(Frame {
                        index,
                        timestamp: frame_timestamp(index, self.info.fps),
                        image,
                    }));
                }
                Some(FfmpegEvent::Log(LogLevel::Fatal, msg)) => {
                    self.close();
                    return Err(LogoTrackError::SourceUnavailable(format!("ffmpeg: {}", msg)));
                }
                Some(FfmpegEvent::Log(LogLevel::Error, msg)) | Some(FfmpegEvent::Error(msg)) => {
                    log::warn!("ffmpeg: {}", msg);
                }
                Some(_) => {}
            }
        }
    }

    fn close(&mut self) {
        self.events = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}
