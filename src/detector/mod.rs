// Detector adapter
//
// The detection model is an external capability. The pipeline only sees
// `Detector::infer`: frame in, labeled pixel boxes with confidence out.

pub mod replay;
#[cfg(feature = "onnx")]
pub mod yolo;

pub use replay::ReplayDetector;
#[cfg(feature = "onnx")]
pub use yolo::{YoloDetector, YoloConfig};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::Frame;

/// Pixel rectangle (xmin, ymin, xmax, ymax). Serialized as a 4-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    /// xmin < xmax and ymin < ymax, all finite.
    pub fn is_valid(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax].iter().all(|v| v.is_finite())
            && self.xmin < self.xmax
            && self.ymin < self.ymax
    }

    /// Integer crop rectangle `(x, y, width, height)` clipped to an image.
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn crop_rect(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        if !self.is_valid() {
            return None;
        }

        let clip = |v: f64, max: u32| -> u32 { v.max(0.0).min(max as f64) as u32 };

        let x1 = clip(self.xmin, image_width);
        let y1 = clip(self.ymin, image_height);
        let x2 = clip(self.xmax, image_width);
        let y2 = clip(self.ymax, image_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some((x1, y1, x2 - x1, y2 - y1))
    }

    /// Opaque string form stored in the `bbox` column.
    pub fn to_column(&self) -> String {
        format!("[{}, {}, {}, {}]", self.xmin, self.ymin, self.xmax, self.ymax)
    }

    pub fn from_column(value: &str) -> Option<Self> {
        serde_json::from_str::<[f64; 4]>(value).ok().map(Self::from)
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.xmin, b.ymin, b.xmax, b.ymax]
    }
}

/// A labeled box reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub confidence: f64,
    pub bbox: BBox,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

pub trait Detector {
    /// Candidates with confidence >= `min_confidence`. An empty list is a
    /// normal result; an error means this frame could not be analysed.
    fn infer(&mut self, frame: &Frame, min_confidence: f64) -> Result<Vec<Candidate>>;

    fn name(&self) -> &str {
        "detector"
    }
}
