// Pipeline orchestrator
//
// Drives frame source -> detector -> gate -> evidence -> store for one video at
// a time, strictly in frame order, and returns the run's statistics.
//
// States: Idle -> Opening -> Running -> Finalizing -> Done, with Failed
// reachable from Opening and Running. Detections are committed one by one, so a
// failed run keeps everything it stored before the failure.

pub mod progress;

#[cfg(test)]
mod tests;

pub use progress::{PipelineObserver, PipelineProgress};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::constants::PROGRESS_LOG_INTERVAL;
use crate::db::{DetectionStore, NewDetection, NewVideoAnalysis};
use crate::detector::Detector;
use crate::error::{LogoTrackError, Result};
use crate::evidence::EvidenceWriter;
use crate::gate;
use crate::media::{self, FrameSource, VideoOpener};
use crate::stats::{Statistics, StatsAggregator};
use crate::thresholds::ThresholdMap;
use progress::notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Opening,
    Running,
    Finalizing,
    Done,
    Failed,
}

/// Check whether a stop was requested.
pub fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}

/// What the running loop produced before finalizing.
struct RunTally {
    aggregator: StatsAggregator,
    frames_read: u64,
    stopped_early: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: DetectionStore,
    detector: Box<dyn Detector>,
    opener: Box<dyn VideoOpener>,
    state: PipelineState,
}

impl Pipeline {
    /// Validate the config and open (or create) its store.
    pub fn new(config: PipelineConfig, detector: Box<dyn Detector>, opener: Box<dyn VideoOpener>) -> Result<Self> {
        config.validate()?;
        let store = DetectionStore::open(&config.store)?;
        Ok(Self::with_store(config, store, detector, opener))
    }

    pub fn with_store(
        config: PipelineConfig,
        store: DetectionStore,
        detector: Box<dyn Detector>,
        opener: Box<dyn VideoOpener>,
    ) -> Self {
        Self {
            config,
            store,
            detector,
            opener,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &DetectionStore {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Thresholds selected by the config's threshold mode.
    pub fn configured_thresholds(&self) -> ThresholdMap {
        self.config.thresholds.resolve()
    }

    /// Process one video to completion.
    pub fn process(&mut self, video_path: &Path, thresholds: &ThresholdMap) -> Result<Statistics> {
        self.process_with(video_path, thresholds, None, None)
    }

    /// Process one video with an optional observer and stop flag. A stop
    /// request ends frame iteration and the run still finalizes.
    pub fn process_with(
        &mut self,
        video_path: &Path,
        thresholds: &ThresholdMap,
        mut observer: Option<&mut dyn PipelineObserver>,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<Statistics> {
        let video_name = media::video_name(video_path);
        self.state = PipelineState::Idle;

        self.transition(PipelineState::Opening, &mut observer);
        if let Err(e) = thresholds.validate() {
            return Err(self.fail(&video_name, e, &mut observer));
        }

        let mut source = match self.opener.open(video_path) {
            Ok(source) => source,
            Err(e) => return Err(self.fail(&video_name, e, &mut observer)),
        };

        log::info!(
            "Processing {} with {} ({} brands, every {} frame(s))",
            video_name,
            self.detector.name(),
            thresholds.len(),
            self.config.sample_every_n_frames
        );

        self.transition(PipelineState::Running, &mut observer);
        let result = self.run_frames(source.as_mut(), &video_name, thresholds, &mut observer, cancel_flag);
        let fps = source.info().fps;
        let estimated_total = source.info().estimated_total_frames();
        source.close();

        let tally = match result {
            Ok(tally) => tally,
            Err(e) => return Err(self.fail(&video_name, e, &mut observer)),
        };

        self.transition(PipelineState::Finalizing, &mut observer);
        let total_frames = estimated_total.unwrap_or(tally.frames_read).max(tally.frames_read);
        let stats = tally.aggregator.finish(
            &video_name,
            total_frames,
            fps,
            self.config.sample_every_n_frames,
            tally.stopped_early,
        );

        let analysis_date = chrono::Utc::now().to_rfc3339();
        let stored = NewVideoAnalysis::from_statistics(&stats, analysis_date)
            .and_then(|analysis| self.store.insert_analysis(&analysis));
        if let Err(e) = stored {
            return Err(self.fail(&video_name, e, &mut observer));
        }

        notify(&mut observer, |o| {
            o.on_progress(
                &PipelineProgress::new(&video_name, PipelineState::Done, tally.frames_read, total_frames)
                    .with_detections(stats.total_detections())
                    .with_message("Analysis complete"),
            )
        });
        self.transition(PipelineState::Done, &mut observer);

        log::info!(
            "Finished {}: {} frames read, {} detections{}",
            video_name,
            tally.frames_read,
            stats.total_detections(),
            if stats.stopped_early { " (stopped early)" } else { "" }
        );

        Ok(stats)
    }

    fn run_frames(
        &mut self,
        source: &mut dyn FrameSource,
        video_name: &str,
        thresholds: &ThresholdMap,
        observer: &mut Option<&mut dyn PipelineObserver>,
        cancel_flag: Option<&AtomicBool>,
    ) -> Result<RunTally> {
        let min_confidence = thresholds.min_confidence().unwrap_or(0.0);
        let sample_every = self.config.sample_every_n_frames.max(1);
        let estimated_total = source.info().estimated_total_frames().unwrap_or(0);
        let evidence = self
            .config
            .save_evidence
            .then(|| EvidenceWriter::new(&self.store.config().evidence_dir, self.config.evidence_quality));

        let mut aggregator = StatsAggregator::new(thresholds);
        let mut frames_read = 0u64;
        let mut detections_stored = 0u64;
        let mut stopped_early = false;

        loop {
            if cancel_flag.map(is_cancelled).unwrap_or(false) {
                log::info!("{}: stop requested after {} frames", video_name, frames_read);
                stopped_early = true;
                break;
            }

            let Some(frame) = source.next_frame()? else {
                break;
            };
            frames_read += 1;

            if frame.index % sample_every == 0 {
                let candidates = match self.detector.infer(&frame, min_confidence) {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        let err = LogoTrackError::FrameInference {
                            frame: frame.index,
                            message: e.to_string(),
                        };
                        log::warn!("{}: {}", video_name, err);
                        Vec::new()
                    }
                };

                let accepted = gate::apply(candidates, thresholds);
                for (ordinal, detection) in accepted.iter().enumerate() {
                    let image_path = evidence
                        .as_ref()
                        .and_then(|writer| writer.capture(video_name, &frame, detection, ordinal));

                    self.store.insert_detection(&NewDetection {
                        video_name: video_name.to_string(),
                        frame_number: frame.index,
                        brand: detection.label.clone(),
                        confidence: detection.confidence,
                        bbox: detection.bbox,
                        timestamp: frame.timestamp,
                        image_path,
                    })?;
                    detections_stored += 1;
                }

                if !accepted.is_empty() {
                    log::debug!("{} frame {}: {} detection(s)", video_name, frame.index, accepted.len());
                }

                aggregator.record_frame(&accepted);
                notify(observer, |o| o.on_frame(&frame, &accepted));
            }

            if frames_read % PROGRESS_LOG_INTERVAL == 0 {
                if estimated_total > 0 {
                    log::info!("{}: processed {}/{} frames", video_name, frames_read, estimated_total);
                } else {
                    log::info!("{}: processed {} frames", video_name, frames_read);
                }
                notify(observer, |o| {
                    o.on_progress(
                        &PipelineProgress::new(video_name, PipelineState::Running, frames_read, estimated_total)
                            .with_detections(detections_stored),
                    )
                });
            }
        }

        Ok(RunTally {
            aggregator,
            frames_read,
            stopped_early,
        })
    }

    fn transition(&mut self, state: PipelineState, observer: &mut Option<&mut dyn PipelineObserver>) {
        log::debug!("Pipeline {:?} -> {:?}", self.state, state);
        self.state = state;
        notify(observer, |o| o.on_state(state));
    }

    fn fail(
        &mut self,
        video_name: &str,
        err: LogoTrackError,
        observer: &mut Option<&mut dyn PipelineObserver>,
    ) -> LogoTrackError {
        log::error!("Processing {} failed: {}", video_name, err);
        self.transition(PipelineState::Failed, observer);
        err
    }
}
