// Pipeline progress payload and observer hook

use serde::Serialize;

use crate::detector::Candidate;
use crate::media::Frame;
use super::PipelineState;

/// Progress snapshot reported while a video is processed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineProgress {
    pub video_name: String,
    pub state: PipelineState,
    pub current: u64,
    /// Estimated frame count; 0 when unknown.
    pub total: u64,
    pub percent: f64,
    pub detections: u64,
    pub message: String,
}

impl PipelineProgress {
    pub fn new(video_name: impl Into<String>, state: PipelineState, current: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64 * 100.0).min(100.0)
        };
        Self {
            video_name: video_name.into(),
            state,
            current,
            total,
            percent,
            detections: 0,
            message: String::new(),
        }
    }

    pub fn with_detections(mut self, detections: u64) -> Self {
        self.detections = detections;
        self
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = msg.into();
        self
    }
}

/// Optional listener layered on top of the headless pipeline.
/// Every method has a no-op default.
pub trait PipelineObserver {
    fn on_state(&mut self, _state: PipelineState) {}

    /// Called for each analysed frame with the detections that passed the gate.
    fn on_frame(&mut self, _frame: &Frame, _accepted: &[Candidate]) {}

    fn on_progress(&mut self, _progress: &PipelineProgress) {}
}

/// Forward to the observer when one is attached.
pub(crate) fn notify<F>(observer: &mut Option<&mut dyn PipelineObserver>, f: F)
where
    F: FnOnce(&mut dyn PipelineObserver),
{
    if let Some(observer) = observer.as_deref_mut() {
        f(observer);
    }
}
