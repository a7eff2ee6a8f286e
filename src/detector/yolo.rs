//! YOLOv8 logo detector backed by ONNX Runtime.
//!
//! Expects a single-output export shaped `[1, 4 + classes, anchors]`, where
//! the first four rows are `cx, cy, w, h` in model input pixels and the rest
//! are per-class scores. Class names come from a labels file, one per line,
//! in training order.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};

use crate::constants::{YOLO_INPUT_SIZE, YOLO_NMS_THRESHOLD};
use crate::error::{LogoTrackError, Result};
use crate::media::Frame;
use super::{BBox, Candidate, Detector};

#[derive(Debug, Clone)]
pub struct YoloConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    /// IoU above which same-class boxes are suppressed.
    pub nms_threshold: f32,
    /// Square model input edge in pixels.
    pub input_size: u32,
}

impl YoloConfig {
    pub fn new(model_path: impl Into<PathBuf>, labels_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            labels_path: labels_path.into(),
            nms_threshold: YOLO_NMS_THRESHOLD,
            input_size: YOLO_INPUT_SIZE,
        }
    }
}

pub struct YoloDetector {
    session: Session,
    labels: Vec<String>,
    config: YoloConfig,
}

impl YoloDetector {
    pub fn new(config: YoloConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(LogoTrackError::Detector(format!(
                "model not found: {}",
                config.model_path.display()
            )));
        }

        let labels = load_labels(&config.labels_path)?;
        let session = create_session(&config.model_path)?;

        log::info!(
            "YOLO detector initialized: {} ({} classes, input {})",
            config.model_path.display(),
            labels.len(),
            config.input_size
        );

        Ok(Self { session, labels, config })
    }

    /// Resize to the model input, scale to [0, 1], lay out as NCHW.
    fn preprocess(&self, image: &RgbImage) -> Result<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let (w, h) = (size as usize, size as usize);

        let mut chw: Vec<f32> = Vec::with_capacity(3 * w * h);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    chw.push(resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0);
                }
            }
        }

        Tensor::from_array((vec![1usize, 3, h, w], chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| LogoTrackError::Detector(format!("failed to create tensor: {}", e)))
    }

    fn run_inference(&mut self, input: Value) -> Result<Vec<f32>> {
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| LogoTrackError::Detector(format!("inference failed: {}", e)))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| LogoTrackError::Detector("missing output0 tensor".to_string()))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| LogoTrackError::Detector(format!("failed to extract tensor: {}", e)))?;

        Ok(tensor.1.iter().copied().collect())
    }

    fn postprocess(
        &self,
        outputs: &[f32],
        frame_width: u32,
        frame_height: u32,
        min_confidence: f32,
    ) -> Result<Vec<Candidate>> {
        let num_classes = self.labels.len();
        let num_features = 4 + num_classes;

        if outputs.is_empty() || outputs.len() % num_features != 0 {
            return Err(LogoTrackError::Detector(format!(
                "output of {} values does not fit {} features",
                outputs.len(),
                num_features
            )));
        }
        let num_boxes = outputs.len() / num_features;

        let rows = Array::from_shape_vec((num_features, num_boxes), outputs.to_vec())
            .map_err(|e| LogoTrackError::Detector(format!("failed to reshape output: {}", e)))?;
        let rows = rows.t();

        let input = self.config.input_size as f32;
        let scale_w = frame_width as f32 / input;
        let scale_h = frame_height as f32 / input;

        let mut boxes: Vec<(usize, f32, [f32; 4])> = Vec::new();
        for i in 0..num_boxes {
            let mut best_class = 0;
            let mut best_score = 0.0f32;
            for c in 0..num_classes {
                let score = rows[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < min_confidence {
                continue;
            }

            let (cx, cy, w, h) = (rows[[i, 0]], rows[[i, 1]], rows[[i, 2]], rows[[i, 3]]);
            let x1 = ((cx - w / 2.0) * scale_w).clamp(0.0, frame_width as f32);
            let y1 = ((cy - h / 2.0) * scale_h).clamp(0.0, frame_height as f32);
            let x2 = ((cx + w / 2.0) * scale_w).clamp(0.0, frame_width as f32);
            let y2 = ((cy + h / 2.0) * scale_h).clamp(0.0, frame_height as f32);

            if x2 > x1 && y2 > y1 {
                boxes.push((best_class, best_score, [x1, y1, x2, y2]));
            }
        }

        let kept = non_maximum_suppression(boxes, self.config.nms_threshold);

        Ok(kept
            .into_iter()
            .map(|(class, score, b)| {
                Candidate::new(
                    self.labels[class].clone(),
                    score as f64,
                    BBox::new(b[0] as f64, b[1] as f64, b[2] as f64, b[3] as f64),
                )
            })
            .collect())
    }
}

impl Detector for YoloDetector {
    fn infer(&mut self, frame: &Frame, min_confidence: f64) -> Result<Vec<Candidate>> {
        let (width, height) = frame.image.dimensions();
        let input = self.preprocess(&frame.image)?;
        let outputs = self.run_inference(input)?;
        let candidates = self.postprocess(&outputs, width, height, min_confidence as f32)?;
        log::debug!("Frame {}: {} candidates", frame.index, candidates.len());
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "yolo"
    }
}

fn load_labels(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        LogoTrackError::Detector(format!("cannot read labels {}: {}", path.display(), e))
    })?;
    let labels: Vec<String> = raw
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();

    if labels.is_empty() {
        return Err(LogoTrackError::Detector(format!("labels file {} is empty", path.display())));
    }
    Ok(labels)
}

/// Greedy per-class NMS, highest score first.
fn non_maximum_suppression(
    mut boxes: Vec<(usize, f32, [f32; 4])>,
    iou_threshold: f32,
) -> Vec<(usize, f32, [f32; 4])> {
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(boxes[i]);

        for j in (i + 1)..boxes.len() {
            if !suppressed[j] && boxes[i].0 == boxes[j].0 && iou(&boxes[i].2, &boxes[j].2) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = inter_w * inter_h;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

fn create_session(model_path: &Path) -> Result<Session> {
    let model_bytes = std::fs::read(model_path)?;

    Session::builder()
        .map_err(|e| LogoTrackError::Detector(format!("failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| LogoTrackError::Detector(format!("failed to set optimization level: {}", e)))?
        .commit_from_memory(&model_bytes)
        .map_err(|e| LogoTrackError::Detector(format!("failed to load ONNX model: {}", e)))
}
