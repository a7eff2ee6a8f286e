// Database migrations
// Versioned migrations are forward-only. Never edit or delete one after it ships.
//
// Stores written by older tools carry no user_version and may hold a detections
// table with a different column set. Those are reconciled first: the old rows
// are backed up, the table is rebuilt with the current columns and the
// intersecting columns are copied forward.

use std::collections::HashSet;
use rusqlite::Connection;

use crate::constants::{DETECTIONS_BACKUP_PREFIX, DETECTIONS_TABLE, DETECTION_COLUMNS};
use crate::error::{LogoTrackError, Result};

const DETECTION_INDEXES: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_detections_video ON detections(video_name);
    CREATE INDEX IF NOT EXISTS idx_detections_brand ON detections(brand);
    CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections(timestamp);
"#;

const VIDEO_ANALYSIS_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS video_analysis (
        video_name TEXT NOT NULL,
        analysis_date TEXT NOT NULL,
        total_frames INTEGER NOT NULL,
        duration_seconds REAL NOT NULL,
        detection_summary TEXT NOT NULL
    );
"#;

fn detections_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            video_name TEXT NOT NULL DEFAULT '',
            frame_number INTEGER NOT NULL DEFAULT 0,
            brand TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0,
            bbox TEXT NOT NULL DEFAULT '[]',
            timestamp REAL NOT NULL DEFAULT 0,
            image_path TEXT
        );",
        table
    )
}

/// All migrations in order. Never reorder; only append.
fn migrations() -> Vec<String> {
    vec![
        // Migration 1: detections + per-run summaries
        format!("{}\n{}", detections_ddl(DETECTIONS_TABLE), VIDEO_ANALYSIS_DDL),
        // Migration 2: query indexes
        format!(
            "{}\n    CREATE INDEX IF NOT EXISTS idx_video_analysis_video ON video_analysis(video_name);",
            DETECTION_INDEXES
        ),
    ]
}

/// Default substituted for NULLs when copying legacy rows forward.
fn column_fallback(column: &str) -> Option<&'static str> {
    match column {
        "video_name" | "brand" => Some("''"),
        "frame_number" | "confidence" | "timestamp" => Some("0"),
        "bbox" => Some("'[]'"),
        _ => None,
    }
}

/// Get current schema version from database
pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Column names of a table, empty when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(columns)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Rebuild a detections table whose columns differ from the current set.
/// Returns the name of the backup table when a rebuild happened.
pub fn reconcile_detections_table(conn: &Connection) -> Result<Option<String>> {
    let existing = table_columns(conn, DETECTIONS_TABLE)?;
    if existing.is_empty() {
        return Ok(None);
    }

    let existing_set: HashSet<&str> = existing.iter().map(|c| c.as_str()).collect();
    let required: HashSet<&str> = DETECTION_COLUMNS.iter().copied().collect();
    if existing_set == required {
        return Ok(None);
    }

    let shared: Vec<&str> = DETECTION_COLUMNS
        .iter()
        .copied()
        .filter(|c| existing_set.contains(c))
        .collect();

    let mut backup = format!(
        "{}{}",
        DETECTIONS_BACKUP_PREFIX,
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    );
    let mut suffix = 1;
    while table_exists(conn, &backup)? {
        suffix += 1;
        backup = format!(
            "{}{}_{}",
            DETECTIONS_BACKUP_PREFIX,
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            suffix
        );
    }

    log::info!(
        "Detections table has columns {:?}; rebuilding (backup: {})",
        existing,
        backup
    );

    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(&format!("CREATE TABLE {} AS SELECT * FROM {}", backup, DETECTIONS_TABLE))?;
    tx.execute_batch("DROP TABLE IF EXISTS detections_rebuild")?;
    tx.execute_batch(&detections_ddl("detections_rebuild"))?;

    if !shared.is_empty() {
        let target_cols = shared.join(", ");
        let select_cols = shared
            .iter()
            .map(|c| match column_fallback(c) {
                Some(fallback) => format!("COALESCE({}, {})", c, fallback),
                None => c.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        tx.execute_batch(&format!(
            "INSERT INTO detections_rebuild (rowid, {}) SELECT rowid, {} FROM {} ORDER BY rowid",
            target_cols, select_cols, DETECTIONS_TABLE
        ))?;
    }

    tx.execute_batch(&format!("DROP TABLE {}", DETECTIONS_TABLE))?;
    tx.execute_batch(&format!("ALTER TABLE detections_rebuild RENAME TO {}", DETECTIONS_TABLE))?;
    tx.execute_batch(DETECTION_INDEXES)?;
    tx.commit()?;

    log::info!("Detections table rebuilt; copied columns {:?}", shared);

    Ok(Some(backup))
}

/// Bring a store up to the current schema (crash-safe, idempotent).
pub fn run_migrations(conn: &Connection) -> Result<()> {
    reconcile_detections_table(conn)?;

    let migrations = migrations();
    let current_version = get_schema_version(conn)?;
    let target_version = migrations.len() as u32;

    // Refuse to open a store created by a newer build
    if current_version > target_version {
        return Err(LogoTrackError::StorageUnavailable(format!(
            "schema version {} is newer than this build supports (max {})",
            current_version, target_version
        )));
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in migrations.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }

        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;

        log::info!("Applied migration {}", migration_version);
    }

    Ok(())
}
