// LogoTrack - Library Entry Point
// Video logo detection pipeline, detection store and screen-time statistics.

pub mod constants;
pub mod error;
pub mod config;
pub mod thresholds;
pub mod media;
pub mod detector;
pub mod gate;
pub mod evidence;
pub mod db;
pub mod stats;
pub mod pipeline;
pub mod commands;

pub use config::{PipelineConfig, StoreConfig, ThresholdMode};
pub use db::DetectionStore;
pub use error::{LogoTrackError, Result};
pub use pipeline::{Pipeline, PipelineObserver, PipelineProgress, PipelineState};
pub use stats::{BrandStats, Statistics};
pub use thresholds::ThresholdMap;
