//! Audit log repository: one row per extraction attempt.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{parse_datetime, parse_datetime_opt, to_option, Result};
use crate::models::{ExtractionRecord, ExtractionStatus};

/// Counts per status for the ops surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub success: i64,
    pub failed: i64,
}

/// SQLite-backed audit log for extraction jobs.
pub struct AuditRepository {
    db_path: PathBuf,
}

impl AuditRepository {
    /// Create a new audit repository.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            -- One row per launch attempt of an extraction job
            CREATE TABLE IF NOT EXISTS extraction_jobs (
                id TEXT PRIMARY KEY,
                service TEXT NOT NULL,
                target_id TEXT NOT NULL,
                job_kind TEXT NOT NULL,
                job_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',

                -- Provider linkage (also mirrored in metadata)
                container_id TEXT,

                -- Timing
                started_at TEXT NOT NULL,
                completed_at TEXT,
                execution_time_ms INTEGER,

                error_message TEXT,
                metadata TEXT NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_extraction_jobs_service_status
                ON extraction_jobs(service, status);
            CREATE INDEX IF NOT EXISTS idx_extraction_jobs_container
                ON extraction_jobs(container_id);
            CREATE INDEX IF NOT EXISTS idx_extraction_jobs_started
                ON extraction_jobs(started_at);
            CREATE INDEX IF NOT EXISTS idx_extraction_jobs_stale
                ON extraction_jobs(started_at) WHERE status = 'pending';
        "#,
        )?;
        Ok(())
    }

    /// Insert a fresh record. Caller builds it via `ExtractionRecord::new_pending`.
    pub fn create(&self, record: &ExtractionRecord) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO extraction_jobs
                (id, service, target_id, job_kind, job_id, status, container_id,
                 started_at, completed_at, execution_time_ms, error_message, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.id,
                record.service,
                record.target_id,
                record.job_kind,
                record.job_id,
                record.status.as_str(),
                record.container_id(),
                record.started_at.to_rfc3339(),
                record.completed_at.map(|t| t.to_rfc3339()),
                record.execution_time_ms,
                record.error_message,
                serde_json::to_string(&record.metadata)?,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ExtractionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM extraction_jobs WHERE id = ?")?;
        to_option(stmt.query_row(params![id], row_to_extraction))
    }

    /// Most recent record for a provider container id, any status. Webhooks
    /// route by container id, and the idempotency check needs terminal rows
    /// too.
    pub fn find_by_container(&self, container_id: &str) -> Result<Option<ExtractionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extraction_jobs
            WHERE container_id = ?
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )?;
        to_option(stmt.query_row(params![container_id], row_to_extraction))
    }

    /// The record the poll worker should be watching: newest pending row
    /// that already knows its container.
    pub fn latest_pending_with_container(&self) -> Result<Option<ExtractionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extraction_jobs
            WHERE status = 'pending' AND container_id IS NOT NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )?;
        to_option(stmt.query_row([], row_to_extraction))
    }

    /// Pending rows older than `cutoff`, oldest first. Monitor input.
    pub fn find_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<ExtractionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extraction_jobs
            WHERE status = 'pending' AND started_at < ?
            ORDER BY started_at ASC
            "#,
        )?;
        let records = stmt
            .query_map(params![cutoff.to_rfc3339()], row_to_extraction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Audit read surface: filter by service and/or status, newest first.
    pub fn list(
        &self,
        service: Option<&str>,
        status: Option<ExtractionStatus>,
        limit: u32,
    ) -> Result<Vec<ExtractionRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM extraction_jobs
            WHERE (?1 IS NULL OR service = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY started_at DESC
            LIMIT ?3
            "#,
        )?;
        let records = stmt
            .query_map(
                params![service, status.map(|s| s.as_str()), limit],
                row_to_extraction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn status_counts(&self) -> Result<StatusCounts> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM extraction_jobs GROUP BY status")?;
        let mut counts = StatusCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match ExtractionStatus::from_str(&status) {
                Some(ExtractionStatus::Pending) => counts.pending = count,
                Some(ExtractionStatus::Success) => counts.success = count,
                Some(ExtractionStatus::Failed) => counts.failed = count,
                None => {}
            }
        }
        Ok(counts)
    }

    /// Record launch output: the provider container id plus launch metadata.
    pub fn record_launch(
        &self,
        id: &str,
        container_id: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<()> = (|| {
            let metadata: String = conn.query_row(
                "SELECT metadata FROM extraction_jobs WHERE id = ?",
                params![id],
                |row| row.get(0),
            )?;
            let mut merged = merge_patch(&metadata, patch)?;
            if let Some(map) = merged.as_object_mut() {
                map.insert(
                    "container_id".to_string(),
                    serde_json::Value::String(container_id.to_string()),
                );
            }
            conn.execute(
                "UPDATE extraction_jobs SET container_id = ?, metadata = ? WHERE id = ?",
                params![container_id, serde_json::to_string(&merged)?, id],
            )?;
            Ok(())
        })();

        finish_tx(&conn, result)
    }

    /// Merge `patch` into a still-pending record's metadata. Terminal rows
    /// are immutable; returns whether the merge applied.
    pub fn merge_metadata_if_pending(&self, id: &str, patch: &serde_json::Value) -> Result<bool> {
        let conn = self.connect()?;
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<bool> = (|| {
            let metadata = match to_option(conn.query_row(
                "SELECT metadata FROM extraction_jobs WHERE id = ? AND status = 'pending'",
                params![id],
                |row| row.get::<_, String>(0),
            ))? {
                Some(metadata) => metadata,
                None => return Ok(false),
            };
            let merged = merge_patch(&metadata, patch)?;
            let updated = conn.execute(
                "UPDATE extraction_jobs SET metadata = ? WHERE id = ? AND status = 'pending'",
                params![serde_json::to_string(&merged)?, id],
            )?;
            Ok(updated == 1)
        })();

        finish_tx(&conn, result)
    }

    /// Move a pending record to a terminal status. First terminal write wins:
    /// if another signal (webhook, poll, monitor) already closed the record
    /// this returns `false` and changes nothing, which is how racing
    /// completion sources stay idempotent.
    pub fn complete(
        &self,
        id: &str,
        status: ExtractionStatus,
        error_message: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<bool> {
        debug_assert!(status.is_terminal());
        let conn = self.connect()?;
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<bool> = (|| {
            let row = to_option(conn.query_row(
                "SELECT started_at, metadata FROM extraction_jobs WHERE id = ? AND status = 'pending'",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            ))?;
            let (started_at, metadata) = match row {
                Some(row) => row,
                None => return Ok(false),
            };

            let completed_at = Utc::now();
            let execution_time_ms =
                (completed_at - parse_datetime(&started_at)).num_milliseconds();
            let merged = merge_patch(&metadata, patch)?;

            let updated = conn.execute(
                r#"
                UPDATE extraction_jobs
                SET status = ?, completed_at = ?, execution_time_ms = ?,
                    error_message = ?, metadata = ?
                WHERE id = ? AND status = 'pending'
                "#,
                params![
                    status.as_str(),
                    completed_at.to_rfc3339(),
                    execution_time_ms,
                    error_message,
                    serde_json::to_string(&merged)?,
                    id,
                ],
            )?;
            Ok(updated == 1)
        })();

        finish_tx(&conn, result)
    }
}

fn finish_tx<T>(conn: &Connection, result: Result<T>) -> Result<T> {
    if result.is_ok() {
        conn.execute("COMMIT", [])?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }
    result
}

fn merge_patch(existing: &str, patch: &serde_json::Value) -> Result<serde_json::Value> {
    let mut base: serde_json::Value =
        serde_json::from_str(existing).unwrap_or_else(|_| serde_json::json!({}));
    if let (Some(base_map), Some(patch_map)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
    Ok(base)
}

/// Parse a database row into an ExtractionRecord.
fn row_to_extraction(row: &rusqlite::Row) -> rusqlite::Result<ExtractionRecord> {
    let metadata_str: String = row.get("metadata")?;
    Ok(ExtractionRecord {
        id: row.get("id")?,
        service: row.get("service")?,
        target_id: row.get("target_id")?,
        job_kind: row.get("job_kind")?,
        job_id: row.get("job_id")?,
        status: ExtractionStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(ExtractionStatus::Pending),
        started_at: parse_datetime(&row.get::<_, String>("started_at")?),
        completed_at: parse_datetime_opt(row.get::<_, Option<String>>("completed_at")?),
        execution_time_ms: row.get("execution_time_ms")?,
        error_message: row.get("error_message")?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or_else(|_| serde_json::json!({})),
    })
}
