// Pipeline scenario tests with in-memory frame sources and scripted detectors

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use super::*;
use crate::config::StoreConfig;
use crate::db::DetectionFilter;
use crate::detector::{BBox, Candidate, ReplayDetector};
use crate::media::source::frame_timestamp;
use crate::media::{Frame, VideoInfo};

// ---------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------

struct FakeSource {
    info: VideoInfo,
    frames: u64,
    next: u64,
    fail_at: Option<u64>,
    closed: Rc<Cell<bool>>,
}

impl FrameSource for FakeSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.fail_at == Some(self.next) {
            return Err(LogoTrackError::SourceUnavailable(format!("corrupt frame {}", self.next)));
        }
        if self.next >= self.frames {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        Ok(Some(Frame {
            index,
            timestamp: frame_timestamp(index, self.info.fps),
            image: RgbImage::from_pixel(64, 48, Rgb([200, 16, 16])),
        }))
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

#[derive(Clone)]
struct FakeOpener {
    frames: u64,
    fps: f64,
    report_total: bool,
    fail_open: bool,
    fail_at: Option<u64>,
    closed: Rc<Cell<bool>>,
}

impl FakeOpener {
    fn new(frames: u64, fps: f64) -> Self {
        Self {
            frames,
            fps,
            report_total: true,
            fail_open: false,
            fail_at: None,
            closed: Rc::new(Cell::new(false)),
        }
    }
}

impl VideoOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if self.fail_open {
            return Err(LogoTrackError::SourceUnavailable(format!("cannot open {}", path.display())));
        }
        Ok(Box::new(FakeSource {
            info: VideoInfo {
                width: 64,
                height: 48,
                fps: self.fps,
                total_frames: self.report_total.then_some(self.frames),
                duration_seconds: None,
            },
            frames: self.frames,
            next: 0,
            fail_at: self.fail_at,
            closed: Rc::clone(&self.closed),
        }))
    }
}

#[derive(Default)]
struct ScriptedDetector {
    by_frame: HashMap<u64, Vec<Candidate>>,
    fail_frames: HashSet<u64>,
    calls: Rc<RefCell<Vec<(u64, f64)>>>,
}

impl ScriptedDetector {
    fn at(mut self, frame: u64, label: &str, confidence: f64) -> Self {
        self.by_frame
            .entry(frame)
            .or_default()
            .push(Candidate::new(label, confidence, BBox::new(8.0, 8.0, 40.0, 32.0)));
        self
    }

    fn at_box(mut self, frame: u64, label: &str, confidence: f64, bbox: BBox) -> Self {
        self.by_frame
            .entry(frame)
            .or_default()
            .push(Candidate::new(label, confidence, bbox));
        self
    }

    fn failing_on(mut self, frame: u64) -> Self {
        self.fail_frames.insert(frame);
        self
    }
}

impl Detector for ScriptedDetector {
    fn infer(&mut self, frame: &Frame, min_confidence: f64) -> Result<Vec<Candidate>> {
        self.calls.borrow_mut().push((frame.index, min_confidence));
        if self.fail_frames.contains(&frame.index) {
            return Err(LogoTrackError::Detector("malformed frame".to_string()));
        }
        Ok(self
            .by_frame
            .get(&frame.index)
            .map(|c| c.iter().filter(|c| c.confidence >= min_confidence).cloned().collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingObserver<'a> {
    states: Vec<PipelineState>,
    frames: Vec<u64>,
    progress: Vec<PipelineProgress>,
    stop_after: Option<(u64, &'a AtomicBool)>,
}

impl PipelineObserver for RecordingObserver<'_> {
    fn on_state(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    fn on_frame(&mut self, frame: &Frame, _accepted: &[Candidate]) {
        self.frames.push(frame.index);
        if let Some((index, flag)) = self.stop_after {
            if frame.index == index {
                flag.store(true, Ordering::Relaxed);
            }
        }
    }

    fn on_progress(&mut self, progress: &PipelineProgress) {
        self.progress.push(progress.clone());
    }
}

fn build(tmp: &TempDir, opener: FakeOpener, detector: ScriptedDetector) -> Pipeline {
    let config = PipelineConfig::new(StoreConfig::under(tmp.path()));
    Pipeline::new(config, Box::new(detector), Box::new(opener)).unwrap()
}

fn adidas() -> ThresholdMap {
    ThresholdMap::new().with("adidas", 0.5)
}

fn all_rows(pipeline: &Pipeline) -> Vec<crate::db::DetectionRow> {
    pipeline.store().query_detections(&DetectionFilter::default()).unwrap()
}

// ---------------------------------------------------------------
// Screen-time scenarios
// ---------------------------------------------------------------

#[test]
fn test_single_detection_in_frame_30() {
    let tmp = TempDir::new().unwrap();
    let opener = FakeOpener::new(100, 10.0);
    let closed = Rc::clone(&opener.closed);
    let mut pipeline = build(&tmp, opener, ScriptedDetector::default().at(30, "adidas", 0.9));

    let stats = pipeline.process(Path::new("/videos/match.mp4"), &adidas()).unwrap();

    let brand = stats.brand("adidas").unwrap();
    assert_eq!(brand.total_detections, 1);
    assert_eq!(brand.frames_with_detections, 1);
    assert!((brand.percentage_time - 1.0).abs() < 1e-9);
    assert_eq!(stats.total_frames, 100);
    assert_eq!(stats.duration, 10.0);
    assert!(!stats.stopped_early);

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].video_name, "match.mp4");
    assert_eq!(rows[0].frame_number, 30);
    assert_eq!(rows[0].timestamp, 3.0);
    assert_eq!(rows[0].confidence, 0.9);

    // Evidence is referenced by file name and exists in the evidence dir
    let image = rows[0].image_path.clone().unwrap();
    assert!(!image.contains('/'));
    assert!(pipeline.store().config().evidence_dir.join(&image).exists());

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert!(closed.get());

    let analyses = pipeline.store().list_analyses(Some("match.mp4"), None).unwrap();
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0].total_frames, 100);
    assert_eq!(analyses[0].summary(), Some(stats));
}

#[test]
fn test_two_boxes_same_frame_count_once() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(30, "adidas", 0.9)
        .at(30, "adidas", 0.6);
    let mut pipeline = build(&tmp, FakeOpener::new(100, 10.0), detector);

    let stats = pipeline.process(Path::new("match.mp4"), &adidas()).unwrap();
    let brand = stats.brand("adidas").unwrap();
    assert_eq!(brand.total_detections, 2);
    assert_eq!(brand.frames_with_detections, 1);

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].image_path, rows[1].image_path);
}

#[test]
fn test_below_threshold_not_stored() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = build(&tmp, FakeOpener::new(100, 10.0), ScriptedDetector::default().at(30, "adidas", 0.4));

    let stats = pipeline.process(Path::new("match.mp4"), &adidas()).unwrap();
    assert_eq!(stats.brand("adidas").unwrap().total_detections, 0);
    assert!(all_rows(&pipeline).is_empty());
}

#[test]
fn test_brands_outside_map_never_stored() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(5, "reebok", 0.99)
        .at(6, "adidas", 0.7);
    let mut pipeline = build(&tmp, FakeOpener::new(20, 10.0), detector);

    let stats = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    assert!(stats.brand("reebok").is_none());

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].brand, "adidas");
}

#[test]
fn test_query_other_brand_is_empty() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = build(&tmp, FakeOpener::new(50, 10.0), ScriptedDetector::default().at(30, "adidas", 0.9));
    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();

    let rows = pipeline
        .store()
        .query_detections(&DetectionFilter::default().brand("nike"))
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_per_brand_thresholds_and_detector_floor() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(1, "adidas", 0.45)
        .at(1, "nike", 0.35)
        .at(2, "nike", 0.25);
    let calls = Rc::clone(&detector.calls);
    let mut pipeline = build(&tmp, FakeOpener::new(5, 5.0), detector);

    let thresholds = ThresholdMap::new().with("adidas", 0.5).with("nike", 0.3);
    let stats = pipeline.process(Path::new("v.mp4"), &thresholds).unwrap();

    assert!(calls.borrow().iter().all(|(_, min)| (*min - 0.3).abs() < 1e-12));
    assert_eq!(stats.brand("adidas").unwrap().total_detections, 0);
    assert_eq!(stats.brand("nike").unwrap().total_detections, 1);

    for (_, b) in &stats.detections {
        assert!(b.frames_with_detections <= stats.total_frames);
        assert!(b.frames_with_detections <= b.total_detections);
    }
}

// ---------------------------------------------------------------
// Delete semantics
// ---------------------------------------------------------------

#[test]
fn test_delete_one_detection() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(10, "adidas", 0.9)
        .at(20, "adidas", 0.8);
    let mut pipeline = build(&tmp, FakeOpener::new(30, 10.0), detector);
    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();

    let rows = all_rows(&pipeline);
    let target = &rows[0];
    let evidence = pipeline
        .store()
        .config()
        .evidence_dir
        .join(target.image_path.as_deref().unwrap());
    assert!(evidence.exists());

    assert_eq!(pipeline.store().delete_detection(target.rowid).unwrap(), 1);
    assert!(!evidence.exists());

    let remaining = all_rows(&pipeline);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0], rows[1]);

    let err = pipeline.store().delete_detection(target.rowid).unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(all_rows(&pipeline).len(), 1);
}

#[test]
fn test_delete_after_reprocessing_keeps_shared_evidence() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = build(&tmp, FakeOpener::new(5, 10.0), ScriptedDetector::default().at(2, "adidas", 0.9));
    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].image_path, rows[1].image_path);
    let evidence = pipeline
        .store()
        .config()
        .evidence_dir
        .join(rows[1].image_path.as_deref().unwrap());

    pipeline.store().delete_detection(rows[0].rowid).unwrap();
    assert!(evidence.exists());
    assert_eq!(all_rows(&pipeline), vec![rows[1].clone()]);

    pipeline.store().delete_detection(rows[1].rowid).unwrap();
    assert!(!evidence.exists());
}

// ---------------------------------------------------------------
// Per-item failures
// ---------------------------------------------------------------

#[test]
fn test_evidence_failure_leaves_sibling_untouched() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(3, "adidas", 0.9)
        .at(3, "adidas", 0.7);
    let mut pipeline = build(&tmp, FakeOpener::new(10, 10.0), detector);

    // A directory squatting on the first box's evidence name makes its rename fail
    let evidence_dir = pipeline.store().config().evidence_dir.clone();
    let blocked = EvidenceWriter::file_name("v.mp4", 3, "adidas", 0.9, 0);
    std::fs::create_dir_all(evidence_dir.join(&blocked).join("occupied")).unwrap();

    let stats = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    assert_eq!(stats.brand("adidas").unwrap().total_detections, 2);

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 2);
    let failed = rows.iter().find(|r| r.confidence == 0.9).unwrap();
    let sibling = rows.iter().find(|r| r.confidence == 0.7).unwrap();

    assert_eq!(failed.image_path, None);
    let sibling_image = sibling.image_path.as_deref().unwrap();
    assert_ne!(sibling_image, blocked);
    assert!(evidence_dir.join(sibling_image).is_file());
}

#[test]
fn test_evidence_failure_still_stores_rows() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(3, "adidas", 0.9)
        .at(3, "adidas", 0.7);
    let mut pipeline = build(&tmp, FakeOpener::new(10, 10.0), detector);

    // Replace the evidence directory with a plain file so every write fails
    let evidence_dir = pipeline.store().config().evidence_dir.clone();
    std::fs::remove_dir_all(&evidence_dir).unwrap();
    std::fs::write(&evidence_dir, b"not a directory").unwrap();

    let stats = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    assert_eq!(stats.brand("adidas").unwrap().total_detections, 2);

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.image_path.is_none()));
}

#[test]
fn test_zero_area_crop_has_no_evidence() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at_box(2, "adidas", 0.9, BBox::new(100.0, 100.0, 120.0, 120.0))
        .at(2, "adidas", 0.8);
    let mut pipeline = build(&tmp, FakeOpener::new(5, 5.0), detector);

    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 2);
    assert!(rows[0].image_path.is_none());
    assert!(rows[1].image_path.is_some());
}

#[test]
fn test_evidence_can_be_disabled() {
    let tmp = TempDir::new().unwrap();
    let mut config = PipelineConfig::new(StoreConfig::under(tmp.path()));
    config.save_evidence = false;
    let detector = ScriptedDetector::default().at(1, "adidas", 0.9);
    let mut pipeline = Pipeline::new(config, Box::new(detector), Box::new(FakeOpener::new(3, 3.0))).unwrap();

    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    assert!(all_rows(&pipeline)[0].image_path.is_none());
    assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 0);
}

#[test]
fn test_inference_failure_is_zero_detections() {
    let tmp = TempDir::new().unwrap();
    let detector = ScriptedDetector::default()
        .at(10, "adidas", 0.9)
        .at(20, "adidas", 0.9)
        .failing_on(10);
    let mut pipeline = build(&tmp, FakeOpener::new(40, 10.0), detector);

    let stats = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    assert_eq!(stats.frames_processed, 40);
    assert_eq!(stats.brand("adidas").unwrap().total_detections, 1);

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].frame_number, 20);
}

// ---------------------------------------------------------------
// Fatal failures
// ---------------------------------------------------------------

#[test]
fn test_open_failure_fails_run() {
    let tmp = TempDir::new().unwrap();
    let mut opener = FakeOpener::new(10, 10.0);
    opener.fail_open = true;
    let mut pipeline = build(&tmp, opener, ScriptedDetector::default());

    let mut observer = RecordingObserver::default();
    let err = pipeline
        .process_with(Path::new("missing.mp4"), &adidas(), Some(&mut observer), None)
        .unwrap_err();

    assert!(matches!(err, LogoTrackError::SourceUnavailable(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(observer.states, vec![PipelineState::Opening, PipelineState::Failed]);
    assert!(pipeline.store().list_analyses(None, None).unwrap().is_empty());
}

#[test]
fn test_decode_failure_keeps_committed_rows() {
    let tmp = TempDir::new().unwrap();
    let mut opener = FakeOpener::new(100, 10.0);
    opener.fail_at = Some(50);
    let closed = Rc::clone(&opener.closed);
    let mut pipeline = build(&tmp, opener, ScriptedDetector::default().at(30, "adidas", 0.9).at(60, "adidas", 0.9));

    let err = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap_err();
    assert!(matches!(err, LogoTrackError::SourceUnavailable(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(closed.get());

    let rows = all_rows(&pipeline);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].frame_number, 30);
    assert!(pipeline.store().list_analyses(None, None).unwrap().is_empty());
}

#[test]
fn test_empty_thresholds_rejected() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = build(&tmp, FakeOpener::new(10, 10.0), ScriptedDetector::default());

    let err = pipeline.process(Path::new("v.mp4"), &ThresholdMap::new()).unwrap_err();
    assert!(matches!(err, LogoTrackError::InvalidThresholds(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

// ---------------------------------------------------------------
// Stop, sampling, progress
// ---------------------------------------------------------------

#[test]
fn test_stop_request_still_finalizes() {
    let tmp = TempDir::new().unwrap();
    let opener = FakeOpener::new(100, 10.0);
    let closed = Rc::clone(&opener.closed);
    let mut pipeline = build(&tmp, opener, ScriptedDetector::default().at(5, "adidas", 0.9).at(50, "adidas", 0.9));

    let stop = AtomicBool::new(false);
    let mut observer = RecordingObserver {
        stop_after: Some((19, &stop)),
        ..Default::default()
    };
    let stats = pipeline
        .process_with(Path::new("v.mp4"), &adidas(), Some(&mut observer), Some(&stop))
        .unwrap();

    assert!(stats.stopped_early);
    assert_eq!(stats.frames_processed, 20);
    assert_eq!(stats.total_frames, 100);
    assert_eq!(stats.brand("adidas").unwrap().total_detections, 1);
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert!(closed.get());
    assert_eq!(pipeline.store().list_analyses(None, None).unwrap().len(), 1);
}

#[test]
fn test_sampling_keeps_true_frame_count() {
    let tmp = TempDir::new().unwrap();
    let mut config = PipelineConfig::new(StoreConfig::under(tmp.path()));
    config.sample_every_n_frames = 10;
    let detector = ScriptedDetector::default()
        .at(30, "adidas", 0.9)
        .at(35, "adidas", 0.9);
    let calls = Rc::clone(&detector.calls);
    let mut pipeline = Pipeline::new(config, Box::new(detector), Box::new(FakeOpener::new(100, 10.0))).unwrap();

    let stats = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();

    assert_eq!(calls.borrow().len(), 10);
    assert_eq!(stats.total_frames, 100);
    assert_eq!(stats.frames_processed, 10);
    assert_eq!(stats.sample_every_n_frames, 10);
    let brand = stats.brand("adidas").unwrap();
    assert_eq!(brand.total_detections, 1);
    assert!((brand.percentage_time - 1.0).abs() < 1e-9);
}

#[test]
fn test_unknown_frame_count_uses_frames_read() {
    let tmp = TempDir::new().unwrap();
    let mut opener = FakeOpener::new(40, 8.0);
    opener.report_total = false;
    let mut pipeline = build(&tmp, opener, ScriptedDetector::default().at(0, "adidas", 0.9));

    let stats = pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    assert_eq!(stats.total_frames, 40);
    assert_eq!(stats.duration, 5.0);
    assert!((stats.brand("adidas").unwrap().percentage_time - 2.5).abs() < 1e-9);
}

#[test]
fn test_observer_sees_states_and_progress() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = build(&tmp, FakeOpener::new(250, 25.0), ScriptedDetector::default().at(7, "adidas", 0.9));

    let mut observer = RecordingObserver::default();
    pipeline
        .process_with(Path::new("v.mp4"), &adidas(), Some(&mut observer), None)
        .unwrap();

    assert_eq!(
        observer.states,
        vec![
            PipelineState::Opening,
            PipelineState::Running,
            PipelineState::Finalizing,
            PipelineState::Done,
        ]
    );
    assert_eq!(observer.frames.len(), 250);

    let running: Vec<u64> = observer
        .progress
        .iter()
        .filter(|p| p.state == PipelineState::Running)
        .map(|p| p.current)
        .collect();
    assert_eq!(running, vec![100, 200]);
    let last = observer.progress.last().unwrap();
    assert_eq!(last.state, PipelineState::Done);
    assert_eq!(last.detections, 1);
}

#[test]
fn test_reprocessing_appends() {
    let tmp = TempDir::new().unwrap();
    let mut pipeline = build(&tmp, FakeOpener::new(10, 10.0), ScriptedDetector::default().at(2, "adidas", 0.9));

    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();
    pipeline.process(Path::new("v.mp4"), &adidas()).unwrap();

    assert_eq!(all_rows(&pipeline).len(), 2);
    assert_eq!(pipeline.store().list_analyses(Some("v.mp4"), None).unwrap().len(), 2);
}

#[test]
fn test_replay_detector_drives_pipeline() {
    let tmp = TempDir::new().unwrap();
    let replay = ReplayDetector::from_json(
        r#"[
            {"frame": 4, "label": "nike", "confidence": 0.8, "bbox": [0, 0, 10, 10]},
            {"frame": 4, "label": "puma", "confidence": 0.2, "bbox": [0, 0, 10, 10]},
            {"frame": 9, "label": "nike", "confidence": 0.6, "bbox": [5, 5, 20, 20]}
        ]"#,
    )
    .unwrap();
    let config = PipelineConfig::new(StoreConfig::under(tmp.path()));
    let mut pipeline = Pipeline::new(config, Box::new(replay), Box::new(FakeOpener::new(10, 10.0))).unwrap();

    let stats = pipeline.process(Path::new("v.mp4"), &ThresholdMap::default_brands()).unwrap();
    assert_eq!(stats.brand("nike").unwrap().total_detections, 2);
    assert_eq!(stats.brand("puma").unwrap().total_detections, 0);
    assert!((stats.brand("nike").unwrap().percentage_time - 20.0).abs() < 1e-9);
}
