// LogoTrack - Detection Commands
// List and delete stored detections.

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::db::{DetectionFilter, DetectionRow};
use crate::error::{LogoTrackError, Result};
use super::connect;

/// Filters accepted by `list_detections`. All optional, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionQuery {
    pub video_name: Option<String>,
    pub brand: Option<String>,
    pub min_confidence: Option<f64>,
    pub frame_start: Option<i64>,
    pub frame_end: Option<i64>,
}

impl DetectionQuery {
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_confidence {
            if !min.is_finite() || !(0.0..=1.0).contains(&min) {
                return Err(LogoTrackError::InvalidConfig(format!(
                    "min_confidence must be within [0, 1], got {}",
                    min
                )));
            }
        }
        for (name, value) in [("frame_start", self.frame_start), ("frame_end", self.frame_end)] {
            if let Some(v) = value {
                if v < 0 {
                    return Err(LogoTrackError::InvalidConfig(format!("{} must be >= 0, got {}", name, v)));
                }
            }
        }
        Ok(())
    }

    fn to_filter(&self) -> DetectionFilter {
        DetectionFilter {
            video_name: self.video_name.clone().filter(|v| !v.is_empty()),
            brand: self.brand.clone().filter(|b| !b.is_empty()),
            min_confidence: self.min_confidence,
            frame_start: self.frame_start,
            frame_end: self.frame_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted: bool,
    pub deleted_count: usize,
}

/// Detections matching the query, ordered by timestamp.
pub fn list_detections(config: &StoreConfig, query: DetectionQuery) -> Result<Vec<DetectionRow>> {
    query.validate()?;
    let store = connect(config)?;

    log::info!("Total detections in store: {}", store.count_detections()?);
    let rows = store.query_detections(&query.to_filter())?;
    log::debug!("Query {:?} returned {} rows", query, rows.len());

    Ok(rows)
}

/// Delete one detection by row identifier, with best-effort evidence cleanup.
pub fn delete_detection(config: &StoreConfig, rowid: i64) -> Result<DeleteResponse> {
    let store = connect(config)?;
    let deleted_count = store.delete_detection(rowid)?;

    Ok(DeleteResponse {
        message: format!("Detection {} deleted", rowid),
        deleted: true,
        deleted_count,
    })
}
