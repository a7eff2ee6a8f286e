// LogoTrack - Commands Module
// Query surface for the dashboard collaborator, organized by domain.
//
// Each command opens a short-lived store from an explicit StoreConfig and
// checks that the backing database exists before touching it.

pub mod detections;
pub mod analyses;

pub use detections::*;
pub use analyses::*;

use crate::config::StoreConfig;
use crate::db::DetectionStore;
use crate::error::Result;

/// Open the store for one command. Missing storage is `StorageUnavailable`.
pub fn connect(config: &StoreConfig) -> Result<DetectionStore> {
    if !config.evidence_dir.is_dir() {
        log::warn!("Evidence directory missing: {}", config.evidence_dir.display());
    }
    DetectionStore::open_existing(config)
}
