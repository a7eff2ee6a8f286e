// Statistics aggregator
//
// Per brand in the threshold map, two running counters updated once per
// processed frame. percentage_time is computed against the source's true frame
// count, not the number of frames that were sampled.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use serde::{Deserialize, Serialize};

use crate::detector::Candidate;
use crate::thresholds::ThresholdMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandStats {
    pub total_detections: u64,
    pub frames_with_detections: u64,
    pub percentage_time: f64,
}

/// Outcome of one pipeline run. Serialized into `video_analysis.detection_summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub video_name: String,
    pub total_frames: u64,
    /// Seconds.
    pub duration: f64,
    pub fps: f64,
    pub frames_processed: u64,
    pub sample_every_n_frames: u64,
    /// True when the run was stopped before the source was exhausted.
    #[serde(default)]
    pub stopped_early: bool,
    pub thresholds_used: ThresholdMap,
    pub detections: BTreeMap<String, BrandStats>,
}

impl Statistics {
    pub fn brand(&self, brand: &str) -> Option<&BrandStats> {
        self.detections.get(brand)
    }

    pub fn total_detections(&self) -> u64 {
        self.detections.values().map(|b| b.total_detections).sum()
    }

    /// Human-readable report.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== LOGO DETECTION REPORT: {} ===", self.video_name);
        let _ = writeln!(out, "Video duration: {:.2} seconds", self.duration);
        let _ = writeln!(out, "Total frames: {}", self.total_frames);
        if self.sample_every_n_frames > 1 {
            let _ = writeln!(
                out,
                "Frames analysed: {} (every {} frames)",
                self.frames_processed, self.sample_every_n_frames
            );
        }
        if self.stopped_early {
            let _ = writeln!(out, "Run stopped early after {} frames", self.frames_processed);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Statistics by brand:");

        for (brand, stats) in &self.detections {
            let threshold = self.thresholds_used.get(brand).unwrap_or(0.0);
            let _ = writeln!(out);
            let _ = writeln!(out, "{} (threshold {:.2}):", brand.to_uppercase(), threshold);
            let _ = writeln!(out, "- Total detections: {}", stats.total_detections);
            let _ = writeln!(out, "- Frames with detections: {}", stats.frames_with_detections);
            let _ = writeln!(out, "- Screen time: {:.2}%", stats.percentage_time);
        }

        out
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_detections: u64,
    frames_with_detections: u64,
}

/// Running tallies for one video.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    thresholds: ThresholdMap,
    counters: BTreeMap<String, Counters>,
    frames_processed: u64,
}

impl StatsAggregator {
    pub fn new(thresholds: &ThresholdMap) -> Self {
        let counters = thresholds
            .brands()
            .map(|b| (b.to_string(), Counters::default()))
            .collect();

        Self {
            thresholds: thresholds.clone(),
            counters,
            frames_processed: 0,
        }
    }

    /// Record one processed frame's accepted detections. Labels outside the
    /// threshold map are ignored.
    pub fn record_frame(&mut self, accepted: &[Candidate]) {
        self.frames_processed += 1;

        let mut per_brand: BTreeMap<&str, u64> = BTreeMap::new();
        for detection in accepted {
            *per_brand.entry(detection.label.as_str()).or_default() += 1;
        }

        for (brand, count) in per_brand {
            if let Some(counter) = self.counters.get_mut(brand) {
                counter.total_detections += count;
                if count > 0 {
                    counter.frames_with_detections += 1;
                }
            }
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn total_detections(&self, brand: &str) -> u64 {
        self.counters.get(brand).map(|c| c.total_detections).unwrap_or(0)
    }

    pub fn finish(
        self,
        video_name: &str,
        total_frames: u64,
        fps: f64,
        sample_every_n_frames: u64,
        stopped_early: bool,
    ) -> Statistics {
        let detections = self
            .counters
            .into_iter()
            .map(|(brand, c)| {
                let stats = BrandStats {
                    total_detections: c.total_detections,
                    frames_with_detections: c.frames_with_detections,
                    percentage_time: percentage(c.frames_with_detections, total_frames),
                };
                (brand, stats)
            })
            .collect();

        let duration = if fps > 0.0 { total_frames as f64 / fps } else { 0.0 };

        Statistics {
            video_name: video_name.to_string(),
            total_frames,
            duration,
            fps,
            frames_processed: self.frames_processed,
            sample_every_n_frames,
            stopped_early,
            thresholds_used: self.thresholds,
            detections,
        }
    }
}

fn percentage(frames_with_detections: u64, total_frames: u64) -> f64 {
    if total_frames == 0 {
        return 0.0;
    }
    100.0 * frames_with_detections as f64 / total_frames as f64
}
