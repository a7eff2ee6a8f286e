// Replays detections exported by an external model run.
//
// Input is a JSON array of `{ "frame": 30, "label": "adidas", "confidence": 0.9,
// "bbox": [x1, y1, x2, y2] }` records, frame indices zero-based.

use std::collections::HashMap;
use std::path::Path;
use serde::Deserialize;

use crate::error::{LogoTrackError, Result};
use crate::media::Frame;
use super::{BBox, Candidate, Detector};

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    frame: u64,
    label: String,
    confidence: f64,
    bbox: BBox,
}

#[derive(Debug, Default)]
pub struct ReplayDetector {
    by_frame: HashMap<u64, Vec<Candidate>>,
}

impl ReplayDetector {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LogoTrackError::Detector(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let records: Vec<ReplayRecord> = serde_json::from_str(raw)?;
        let mut by_frame: HashMap<u64, Vec<Candidate>> = HashMap::new();
        let mut skipped = 0usize;

        for record in records {
            if !record.bbox.is_valid() || !(0.0..=1.0).contains(&record.confidence) {
                skipped += 1;
                continue;
            }
            by_frame
                .entry(record.frame)
                .or_default()
                .push(Candidate::new(record.label, record.confidence, record.bbox));
        }

        if skipped > 0 {
            log::warn!("Replay: skipped {} malformed records", skipped);
        }

        Ok(Self { by_frame })
    }

    pub fn frame_count(&self) -> usize {
        self.by_frame.len()
    }
}

impl Detector for ReplayDetector {
    fn infer(&mut self, frame: &Frame, min_confidence: f64) -> Result<Vec<Candidate>> {
        Ok(self
            .by_frame
            .get(&frame.index)
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|c| c.confidence >= min_confidence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
