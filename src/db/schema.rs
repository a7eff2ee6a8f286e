// Database schema types and query helpers

use rusqlite::{Connection, params, params_from_iter, OptionalExtension};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::detector::BBox;
use crate::error::Result;
use crate::stats::Statistics;

// ----- Detection -----

/// A detection about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    pub video_name: String,
    pub frame_number: u64,
    pub brand: String,
    pub confidence: f64,
    pub bbox: BBox,
    pub timestamp: f64,
    pub image_path: Option<String>,
}

/// A stored detection. `rowid` is the identifier used for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRow {
    pub rowid: i64,
    pub video_name: String,
    pub frame_number: i64,
    pub brand: String,
    pub confidence: f64,
    pub bbox: String,
    pub timestamp: f64,
    pub image_path: Option<String>,
}

impl DetectionRow {
    pub fn parsed_bbox(&self) -> Option<BBox> {
        BBox::from_column(&self.bbox)
    }
}

const DETECTION_SELECT: &str =
    "SELECT rowid, video_name, frame_number, brand, confidence, bbox, timestamp, image_path FROM detections";

fn row_to_detection(row: &rusqlite::Row) -> rusqlite::Result<DetectionRow> {
    Ok(DetectionRow {
        rowid: row.get(0)?,
        video_name: row.get(1)?,
        frame_number: row.get(2)?,
        brand: row.get(3)?,
        confidence: row.get(4)?,
        bbox: row.get(5)?,
        timestamp: row.get(6)?,
        image_path: row.get(7)?,
    })
}

pub fn insert_detection(conn: &Connection, detection: &NewDetection) -> Result<i64> {
    conn.execute(
        "INSERT INTO detections (video_name, frame_number, brand, confidence, bbox, timestamp, image_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            detection.video_name,
            detection.frame_number as i64,
            detection.brand,
            detection.confidence,
            detection.bbox.to_column(),
            detection.timestamp,
            detection.image_path,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_detection(conn: &Connection, rowid: i64) -> Result<Option<DetectionRow>> {
    let result = conn
        .query_row(
            &format!("{} WHERE rowid = ?1", DETECTION_SELECT),
            params![rowid],
            row_to_detection,
        )
        .optional()?;
    Ok(result)
}

/// Returns the number of rows removed (0 or 1).
pub fn delete_detection_row(conn: &Connection, rowid: i64) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM detections WHERE rowid = ?1", params![rowid])?;
    Ok(deleted)
}

pub fn count_detections(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
    Ok(count)
}

/// Rows whose evidence reference is `image_ref`.
pub fn count_image_refs(conn: &Connection, image_ref: &str) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM detections WHERE image_path = ?1",
        [image_ref],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Predicates combined with AND. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFilter {
    /// Case-insensitive substring of `video_name`.
    pub video_name: Option<String>,
    /// Exact brand.
    pub brand: Option<String>,
    pub min_confidence: Option<f64>,
    /// Inclusive lower frame bound.
    pub frame_start: Option<i64>,
    /// Inclusive upper frame bound.
    pub frame_end: Option<i64>,
}

impl DetectionFilter {
    pub fn video(mut self, video_name: impl Into<String>) -> Self {
        self.video_name = Some(video_name.into());
        self
    }

    pub fn brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    pub fn frames(mut self, start: Option<i64>, end: Option<i64>) -> Self {
        self.frame_start = start;
        self.frame_end = end;
        self
    }
}

/// Escape LIKE wildcards so the filter matches literally.
fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Matching detections ordered by timestamp, then insertion order.
pub fn query_detections(conn: &Connection, filter: &DetectionFilter) -> Result<Vec<DetectionRow>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(video) = &filter.video_name {
        clauses.push("video_name LIKE ? ESCAPE '\\'");
        values.push(Value::Text(like_pattern(video)));
    }
    if let Some(brand) = &filter.brand {
        clauses.push("brand = ?");
        values.push(Value::Text(brand.clone()));
    }
    if let Some(min) = filter.min_confidence {
        clauses.push("confidence >= ?");
        values.push(Value::Real(min));
    }
    if let Some(start) = filter.frame_start {
        clauses.push("frame_number >= ?");
        values.push(Value::Integer(start));
    }
    if let Some(end) = filter.frame_end {
        clauses.push("frame_number <= ?");
        values.push(Value::Integer(end));
    }

    let mut sql = DETECTION_SELECT.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY timestamp ASC, rowid ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), row_to_detection)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ----- Timeline -----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub brand: String,
    pub timestamp: f64,
    pub confidence: f64,
}

pub fn brand_timeline(conn: &Connection, video_name: &str) -> Result<Vec<TimelinePoint>> {
    let mut stmt = conn.prepare(
        "SELECT brand, timestamp, confidence FROM detections
         WHERE video_name = ?1 ORDER BY timestamp ASC, rowid ASC",
    )?;
    let points = stmt
        .query_map(params![video_name], |row| {
            Ok(TimelinePoint {
                brand: row.get(0)?,
                timestamp: row.get(1)?,
                confidence: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(points)
}

// ----- Video analysis -----

#[derive(Debug, Clone, PartialEq)]
pub struct NewVideoAnalysis {
    pub video_name: String,
    /// ISO-8601
    pub analysis_date: String,
    pub total_frames: u64,
    pub duration_seconds: f64,
    pub detection_summary: String,
}

impl NewVideoAnalysis {
    pub fn from_statistics(stats: &Statistics, analysis_date: String) -> Result<Self> {
        Ok(Self {
            video_name: stats.video_name.clone(),
            analysis_date,
            total_frames: stats.total_frames,
            duration_seconds: stats.duration,
            detection_summary: serde_json::to_string(stats)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    pub rowid: i64,
    pub video_name: String,
    pub analysis_date: String,
    pub total_frames: i64,
    pub duration_seconds: f64,
    pub detection_summary: String,
}

impl VideoAnalysis {
    /// Parsed summary, `None` for rows written by tools with another format.
    pub fn summary(&self) -> Option<Statistics> {
        serde_json::from_str(&self.detection_summary).ok()
    }
}

pub fn insert_analysis(conn: &Connection, analysis: &NewVideoAnalysis) -> Result<i64> {
    conn.execute(
        "INSERT INTO video_analysis (video_name, analysis_date, total_frames, duration_seconds, detection_summary)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            analysis.video_name,
            analysis.analysis_date,
            analysis.total_frames as i64,
            analysis.duration_seconds,
            analysis.detection_summary,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest first. `video_filter` is an exact video name.
pub fn list_analyses(conn: &Connection, video_filter: Option<&str>, limit: Option<u32>) -> Result<Vec<VideoAnalysis>> {
    let mut sql = String::from(
        "SELECT rowid, video_name, analysis_date, total_frames, duration_seconds, detection_summary
         FROM video_analysis",
    );
    let mut values: Vec<Value> = Vec::new();

    if let Some(video) = video_filter {
        sql.push_str(" WHERE video_name = ?");
        values.push(Value::Text(video.to_string()));
    }
    sql.push_str(" ORDER BY analysis_date DESC, rowid DESC");
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        values.push(Value::Integer(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(VideoAnalysis {
                rowid: row.get(0)?,
                video_name: row.get(1)?,
                analysis_date: row.get(2)?,
                total_frames: row.get(3)?,
                duration_seconds: row.get(4)?,
                detection_summary: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
