// Explicit configuration passed at construction time.
// Nothing here looks at the current working directory.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DB_FILENAME, EVIDENCE_FOLDER, DEFAULT_SAMPLE_EVERY_N_FRAMES, EVIDENCE_QUALITY,
};
use crate::error::{LogoTrackError, Result};
use crate::thresholds::ThresholdMap;

/// Where detections and evidence images live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub evidence_dir: PathBuf,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<PathBuf>, evidence_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            evidence_dir: evidence_dir.into(),
        }
    }

    /// Standard layout: `<root>/detections.db` and `<root>/images/`.
    pub fn under(root: &Path) -> Self {
        Self::new(root.join(DB_FILENAME), root.join(EVIDENCE_FOLDER))
    }
}

/// How per-brand thresholds are specified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Each brand carries its own threshold.
    PerBrand { thresholds: ThresholdMap },
    /// One threshold shared by a list of brands.
    Global { threshold: f64, brands: Vec<String> },
}

impl ThresholdMode {
    pub fn resolve(&self) -> ThresholdMap {
        match self {
            ThresholdMode::PerBrand { thresholds } => thresholds.clone(),
            ThresholdMode::Global { threshold, brands } => {
                ThresholdMap::uniform(brands.iter().cloned(), *threshold)
            }
        }
    }
}

impl Default for ThresholdMode {
    fn default() -> Self {
        ThresholdMode::PerBrand { thresholds: ThresholdMap::default_brands() }
    }
}

fn default_sample_every() -> u64 {
    DEFAULT_SAMPLE_EVERY_N_FRAMES
}

fn default_true() -> bool {
    true
}

fn default_quality() -> u8 {
    EVIDENCE_QUALITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub thresholds: ThresholdMode,
    /// Run the detector on every Nth frame. `total_frames` in statistics is
    /// always the source's true frame count.
    #[serde(default = "default_sample_every")]
    pub sample_every_n_frames: u64,
    #[serde(default = "default_true")]
    pub save_evidence: bool,
    #[serde(default = "default_quality")]
    pub evidence_quality: u8,
}

/// On-disk form of `PipelineConfig`. The store is optional because a config
/// file usually lives inside the store it describes.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    store: Option<StoreConfig>,
    #[serde(default)]
    thresholds: ThresholdMode,
    #[serde(default = "default_sample_every")]
    sample_every_n_frames: u64,
    #[serde(default = "default_true")]
    save_evidence: bool,
    #[serde(default = "default_quality")]
    evidence_quality: u8,
}

impl PipelineConfig {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            thresholds: ThresholdMode::default(),
            sample_every_n_frames: DEFAULT_SAMPLE_EVERY_N_FRAMES,
            save_evidence: true,
            evidence_quality: EVIDENCE_QUALITY,
        }
    }

    /// Load a JSON config file. `default_store` is used when the file names no store.
    pub fn load(path: &Path, default_store: StoreConfig) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LogoTrackError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file: ConfigFile = serde_json::from_str(&raw)?;
        let config = PipelineConfig {
            store: file.store.unwrap_or(default_store),
            thresholds: file.thresholds,
            sample_every_n_frames: file.sample_every_n_frames,
            save_evidence: file.save_evidence,
            evidence_quality: file.evidence_quality,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_every_n_frames == 0 {
            return Err(LogoTrackError::InvalidConfig(
                "sample_every_n_frames must be at least 1".to_string(),
            ));
        }
        if self.evidence_quality == 0 || self.evidence_quality > 100 {
            return Err(LogoTrackError::InvalidConfig(format!(
                "evidence_quality must be within 1..=100, got {}",
                self.evidence_quality
            )));
        }
        self.thresholds.resolve().validate()
    }
}
