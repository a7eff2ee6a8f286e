// LogoTrack Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogoTrackError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Video source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Detection not found: {0}")]
    DetectionNotFound(i64),

    #[error("Evidence write failed: {0}")]
    EvidenceWrite(String),

    #[error("Inference failed on frame {frame}: {message}")]
    FrameInference { frame: u64, message: String },

    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Detector error: {0}")]
    Detector(String),
}

impl LogoTrackError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LogoTrackError::DetectionNotFound(_))
    }

    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, LogoTrackError::StorageUnavailable(_))
    }

    /// Per-item failures that a run survives.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            LogoTrackError::EvidenceWrite(_) | LogoTrackError::FrameInference { .. }
        )
    }

    /// HTTP-equivalent status for the query surface.
    pub fn status_code(&self) -> u16 {
        match self {
            LogoTrackError::DetectionNotFound(_) => 404,
            LogoTrackError::StorageUnavailable(_) => 503,
            LogoTrackError::InvalidThresholds(_) | LogoTrackError::InvalidConfig(_) => 400,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogoTrackError>;
