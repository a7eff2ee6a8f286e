// LogoTrack - Analysis Commands
// Run history and per-video brand timelines.

use crate::config::StoreConfig;
use crate::db::{TimelinePoint, VideoAnalysis};
use crate::error::Result;
use super::connect;

/// Stored analyses, newest first.
pub fn list_analyses(config: &StoreConfig, video_name: Option<&str>, limit: Option<u32>) -> Result<Vec<VideoAnalysis>> {
    let store = connect(config)?;
    store.list_analyses(video_name, limit)
}

/// `(brand, timestamp, confidence)` for every detection of one video.
pub fn brand_timeline(config: &StoreConfig, video_name: &str) -> Result<Vec<TimelinePoint>> {
    let store = connect(config)?;
    store.brand_timeline(video_name)
}
