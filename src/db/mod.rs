// Database module
//
// DetectionStore owns one connection to the detections database and the
// evidence directory that its rows reference.

pub mod migrations;
pub mod schema;

pub use schema::{
    DetectionFilter, DetectionRow, NewDetection, NewVideoAnalysis, TimelinePoint, VideoAnalysis,
};

use rusqlite::Connection;
use std::path::Path;

use crate::config::StoreConfig;
use crate::constants::EVIDENCE_QUALITY;
use crate::error::{LogoTrackError, Result};
use crate::evidence::EvidenceWriter;

fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path).map_err(|e| {
        LogoTrackError::StorageUnavailable(format!("cannot open {}: {}", db_path.display(), e))
    })?;

    // Enable WAL mode for concurrent appenders and readers
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA busy_timeout=5000;")?;

    Ok(conn)
}

pub struct DetectionStore {
    conn: Connection,
    config: StoreConfig,
}

impl DetectionStore {
    /// Open or create the store, creating its directories as needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                LogoTrackError::StorageUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::create_dir_all(&config.evidence_dir).map_err(|e| {
            LogoTrackError::StorageUnavailable(format!("{}: {}", config.evidence_dir.display(), e))
        })?;

        let store = Self {
            conn: open_connection(&config.db_path)?,
            config: config.clone(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open a store that must already exist. Used by the query surface.
    pub fn open_existing(config: &StoreConfig) -> Result<Self> {
        if !config.db_path.exists() {
            return Err(LogoTrackError::StorageUnavailable(format!(
                "database not found at {}",
                config.db_path.display()
            )));
        }

        let store = Self {
            conn: open_connection(&config.db_path)?,
            config: config.clone(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Idempotent create-or-migrate.
    pub fn ensure_schema(&self) -> Result<()> {
        migrations::run_migrations(&self.conn).map_err(|e| match e {
            LogoTrackError::Database(err) if is_unwritable(&err) => {
                LogoTrackError::StorageUnavailable(format!(
                    "{} is not writable: {}",
                    self.config.db_path.display(),
                    err
                ))
            }
            other => other,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Appends one row. Each call commits on its own.
    pub fn insert_detection(&self, detection: &NewDetection) -> Result<i64> {
        schema::insert_detection(&self.conn, detection)
    }

    pub fn insert_analysis(&self, analysis: &NewVideoAnalysis) -> Result<i64> {
        schema::insert_analysis(&self.conn, analysis)
    }

    pub fn query_detections(&self, filter: &DetectionFilter) -> Result<Vec<DetectionRow>> {
        schema::query_detections(&self.conn, filter)
    }

    pub fn get_detection(&self, rowid: i64) -> Result<Option<DetectionRow>> {
        schema::get_detection(&self.conn, rowid)
    }

    /// Delete one detection and, best-effort, its evidence file. The file is
    /// kept while other rows still reference it. Returns the number of rows removed.
    pub fn delete_detection(&self, rowid: i64) -> Result<usize> {
        let row = schema::get_detection(&self.conn, rowid)?
            .ok_or(LogoTrackError::DetectionNotFound(rowid))?;

        let deleted = schema::delete_detection_row(&self.conn, rowid)?;
        if deleted == 0 {
            return Err(LogoTrackError::DetectionNotFound(rowid));
        }

        log::info!("Deleted detection {} ({} frame {})", rowid, row.video_name, row.frame_number);

        if let Some(image_ref) = row.image_path.as_deref().filter(|r| !r.is_empty()) {
            match schema::count_image_refs(&self.conn, image_ref) {
                Ok(0) => {
                    EvidenceWriter::new(&self.config.evidence_dir, EVIDENCE_QUALITY).remove(image_ref);
                }
                Ok(others) => {
                    log::info!("Evidence {} kept: {} other row(s) reference it", image_ref, others);
                }
                Err(e) => {
                    log::warn!("Evidence {} kept: reference check failed: {}", image_ref, e);
                }
            }
        }

        Ok(deleted)
    }

    pub fn count_detections(&self) -> Result<i64> {
        schema::count_detections(&self.conn)
    }

    pub fn list_analyses(&self, video_filter: Option<&str>, limit: Option<u32>) -> Result<Vec<VideoAnalysis>> {
        schema::list_analyses(&self.conn, video_filter, limit)
    }

    pub fn brand_timeline(&self, video_name: &str) -> Result<Vec<TimelinePoint>> {
        schema::brand_timeline(&self.conn, video_name)
    }
}

fn is_unwritable(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ReadOnly)
            | Some(rusqlite::ErrorCode::CannotOpen)
            | Some(rusqlite::ErrorCode::PermissionDenied)
    )
}
