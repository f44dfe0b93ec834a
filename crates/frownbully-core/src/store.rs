//! SQLite storage for detection records.
//!
//! One row per captured image. Confidence columns start out NULL and are
//! filled once the inference report for that image has been parsed.

use crate::types::{Label, PredictionSet};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Alert threshold stored with new records unless overridden.
pub const DEFAULT_NOTIFICATION_THRESHOLD: f64 = 0.5;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS detections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_path TEXT NOT NULL,
    bunny_line DECIMAL(5,4),
    chin DECIMAL(5,4),
    crows_feet DECIMAL(5,4),
    forehead DECIMAL(5,4),
    frown_line DECIMAL(5,4),
    gummy_smile DECIMAL(5,4),
    masseter DECIMAL(5,4),
    sad_smile DECIMAL(5,4),
    smoker_lines DECIMAL(5,4),
    notification TEXT CHECK(notification IN ('YES', 'NO')),
    notification_threshold DECIMAL(5,4)
);
CREATE INDEX IF NOT EXISTS idx_detections_image_path ON detections(image_path);
";

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("storage write failed: {0}")]
    WriteFailure(#[from] rusqlite::Error),
    #[error("no detection record for {}", .0.display())]
    UnknownCapture(PathBuf),
    #[error("failed to create database directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A stored detection row.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub id: i64,
    pub image_path: String,
    /// One entry per [`Label::ALL`], in that order.
    pub scores: Vec<(Label, Option<f64>)>,
    pub notified: bool,
    pub notification_threshold: Option<f64>,
}

impl DetectionRecord {
    pub fn score(&self, label: Label) -> Option<f64> {
        self.scores
            .iter()
            .find(|(l, _)| *l == label)
            .and_then(|(_, s)| *s)
    }
}

pub struct DetectionStore {
    conn: Connection,
    notification_threshold: f64,
}

impl DetectionStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %e, "failed to enable WAL mode");
        }
        let store = Self::with_connection(conn)?;
        tracing::info!(path = %path.display(), "detection database ready");
        Ok(store)
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            notification_threshold: DEFAULT_NOTIFICATION_THRESHOLD,
        })
    }

    /// Threshold written into `notification_threshold` for new records.
    pub fn with_notification_threshold(mut self, threshold: f64) -> Self {
        self.notification_threshold = threshold;
        self
    }

    /// Insert a record for a freshly captured image, all confidences NULL.
    pub fn record_capture(&self, image_path: &Path) -> Result<i64, PersistenceError> {
        self.conn
            .execute(
                "INSERT INTO detections (image_path, notification, notification_threshold)
                 VALUES (?1, 'NO', ?2)",
                params![path_key(image_path), round4(self.notification_threshold)],
            )
            .map_err(|e| log_write_error(image_path, e))?;

        let id = self.conn.last_insert_rowid();
        tracing::info!(id, path = %image_path.display(), "detection record created");
        Ok(id)
    }

    /// Fill the confidence columns of the newest record for `image_path`.
    ///
    /// Only labels present in `predictions` are written; labels without a
    /// column are ignored. Returns the number of columns written. An empty
    /// set (or one with no known labels) performs no write.
    pub fn record_predictions(
        &self,
        image_path: &Path,
        predictions: &PredictionSet,
    ) -> Result<usize, PersistenceError> {
        if predictions.is_empty() {
            tracing::warn!(path = %image_path.display(), "no predictions to record; skipping update");
            return Ok(0);
        }

        let mut columns: BTreeMap<Label, f64> = BTreeMap::new();
        for (raw, confidence) in predictions.iter() {
            match Label::from_report_label(raw) {
                Some(label) => {
                    let slot = columns.entry(label).or_insert(confidence);
                    *slot = slot.max(confidence);
                }
                None => tracing::warn!(label = raw, "ignoring unknown label"),
            }
        }

        if columns.is_empty() {
            tracing::warn!(path = %image_path.display(), "no known labels in predictions; skipping update");
            return Ok(0);
        }

        // Column names come only from the `Label` whitelist.
        let assignments: Vec<String> = columns
            .keys()
            .enumerate()
            .map(|(i, label)| format!("{} = ?{}", label.column(), i + 1))
            .collect();
        let sql = format!(
            "UPDATE detections SET {} WHERE id = \
             (SELECT MAX(id) FROM detections WHERE image_path = ?{})",
            assignments.join(", "),
            columns.len() + 1
        );

        let mut values: Vec<Value> = columns.values().map(|&c| Value::Real(round4(c))).collect();
        values.push(Value::Text(path_key(image_path)));

        let changed = self
            .conn
            .execute(&sql, rusqlite::params_from_iter(values))
            .map_err(|e| log_write_error(image_path, e))?;

        if changed == 0 {
            tracing::error!(path = %image_path.display(), "no detection record to update");
            return Err(PersistenceError::UnknownCapture(image_path.to_path_buf()));
        }

        tracing::info!(path = %image_path.display(), columns = columns.len(), "predictions stored");
        Ok(columns.len())
    }

    /// Flag the newest record for `image_path` as having raised an alert.
    pub fn mark_notified(&self, image_path: &Path) -> Result<(), PersistenceError> {
        let changed = self
            .conn
            .execute(
                "UPDATE detections SET notification = 'YES' WHERE id = \
                 (SELECT MAX(id) FROM detections WHERE image_path = ?1)",
                params![path_key(image_path)],
            )
            .map_err(|e| log_write_error(image_path, e))?;

        if changed == 0 {
            return Err(PersistenceError::UnknownCapture(image_path.to_path_buf()));
        }
        Ok(())
    }

    /// Newest record for `image_path`, if any.
    pub fn find(&self, image_path: &Path) -> Result<Option<DetectionRecord>, PersistenceError> {
        let sql = format!(
            "{} WHERE image_path = ?1 ORDER BY id DESC LIMIT 1",
            select_columns()
        );
        let record = self
            .conn
            .query_row(&sql, params![path_key(image_path)], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<DetectionRecord>, PersistenceError> {
        let sql = format!("{} ORDER BY id DESC LIMIT ?1", select_columns());
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

fn select_columns() -> String {
    let labels: Vec<&str> = Label::ALL.iter().map(|l| l.column()).collect();
    format!(
        "SELECT id, image_path, {}, notification, notification_threshold FROM detections",
        labels.join(", ")
    )
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DetectionRecord> {
    let mut scores = Vec::with_capacity(Label::ALL.len());
    for (i, label) in Label::ALL.into_iter().enumerate() {
        scores.push((label, row.get::<_, Option<f64>>(2 + i)?));
    }
    let base = 2 + Label::ALL.len();
    let notification: Option<String> = row.get(base)?;
    Ok(DetectionRecord {
        id: row.get(0)?,
        image_path: row.get(1)?,
        scores,
        notified: notification.as_deref() == Some("YES"),
        notification_threshold: row.get(base + 1)?,
    })
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// DECIMAL(5,4) precision.
fn round4(value: f64) -> f64 {
    (value.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0
}

fn log_write_error(image_path: &Path, e: rusqlite::Error) -> PersistenceError {
    tracing::error!(path = %image_path.display(), error = %e, "database write failed");
    PersistenceError::WriteFailure(e)
}
