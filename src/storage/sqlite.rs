//! SQLite engine holding both the signature table and the scan history.

use super::{HistorySink, SignatureStore, SEARCH_LIMIT};
use crate::errors::{MalguardError, MalguardResult};
use crate::hasher::normalize_hash;
use crate::models::{Classification, HistoryStats, ScanResult, Severity, SignatureRecord};
use chrono::{DateTime, Local};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS signatures (
        hash TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        severity TEXT NOT NULL DEFAULT 'medium',
        source TEXT NOT NULL DEFAULT 'user',
        added_on TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS scan_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        artifact_path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_size INTEGER NOT NULL,
        extension TEXT NOT NULL,
        file_hash TEXT,
        detected INTEGER NOT NULL,
        malware_name TEXT,
        severity TEXT,
        reason TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        from_archive TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_signatures_name ON signatures(name);
    CREATE INDEX IF NOT EXISTS idx_signatures_severity ON signatures(severity);
    CREATE INDEX IF NOT EXISTS idx_history_detected ON scan_history(detected);
";

const SIGNATURE_COLUMNS: &str = "hash, name, severity, source, added_on";

const HISTORY_COLUMNS: &str =
    "artifact_path, file_name, file_size, extension, file_hash, detected, malware_name, severity, reason, timestamp, from_archive";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file and make sure the schema exists
    pub fn open(path: &Path) -> MalguardResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MalguardError::io(e, parent.to_path_buf()))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> MalguardResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MalguardResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn query_signatures(&self, sql: &str, args: impl rusqlite::Params) -> MalguardResult<Vec<SignatureRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(args, signature_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

fn parse_column<T>(index: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = MalguardError>,
{
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn signature_from_row(row: &Row<'_>) -> rusqlite::Result<SignatureRecord> {
    Ok(SignatureRecord {
        hash: row.get(0)?,
        name: row.get(1)?,
        severity: parse_column(2, row.get(2)?)?,
        source: row.get(3)?,
        added_on: row.get(4)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<ScanResult> {
    let severity: Option<String> = row.get(7)?;
    let timestamp: String = row.get(9)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|t| t.with_timezone(&Local))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(ScanResult {
        artifact_path: row.get(0)?,
        file_name: row.get(1)?,
        file_size: row.get::<_, i64>(2)? as u64,
        extension: row.get(3)?,
        hash: row.get(4)?,
        detected: row.get::<_, i64>(5)? != 0,
        malware_name: row.get(6)?,
        severity: severity.map(|s| parse_column::<Severity>(7, s)).transpose()?,
        reason: parse_column::<Classification>(8, row.get(8)?)?,
        timestamp,
        from_archive: row.get(10)?,
    })
}

impl SignatureStore for SqliteStore {
    fn add(&self, hash: &str, name: &str, severity: Severity, source: &str) -> MalguardResult<bool> {
        let hash = normalize_hash(hash);
        let added_on = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO signatures (hash, name, severity, source, added_on)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![hash, name, severity.as_str(), source, added_on],
        )?;
        if inserted == 0 {
            log::info!("Signature already exists: {}", name);
        }
        Ok(inserted > 0)
    }

    fn remove(&self, hash: &str) -> MalguardResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM signatures WHERE hash = ?1", params![normalize_hash(hash)])?;
        Ok(removed > 0)
    }

    fn get(&self, hash: &str) -> MalguardResult<Option<SignatureRecord>> {
        let sql = format!("SELECT {} FROM signatures WHERE hash = ?1", SIGNATURE_COLUMNS);
        let result = self
            .conn()
            .query_row(&sql, params![normalize_hash(hash)], signature_from_row);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, limit: usize, offset: usize) -> MalguardResult<Vec<SignatureRecord>> {
        let sql = format!(
            "SELECT {} FROM signatures ORDER BY added_on DESC, hash LIMIT ?1 OFFSET ?2",
            SIGNATURE_COLUMNS
        );
        self.query_signatures(&sql, params![limit as i64, offset as i64])
    }

    fn search(&self, query: &str) -> MalguardResult<Vec<SignatureRecord>> {
        let sql = format!(
            "SELECT {} FROM signatures WHERE LOWER(name) LIKE ?1 OR hash LIKE ?1
             ORDER BY added_on DESC, hash LIMIT ?2",
            SIGNATURE_COLUMNS
        );
        let pattern = format!("%{}%", query.to_lowercase());
        self.query_signatures(&sql, params![pattern, SEARCH_LIMIT as i64])
    }

    fn filter_by_severity(&self, severity: Severity) -> MalguardResult<Vec<SignatureRecord>> {
        let sql = format!(
            "SELECT {} FROM signatures WHERE severity = ?1 ORDER BY added_on DESC, hash",
            SIGNATURE_COLUMNS
        );
        self.query_signatures(&sql, params![severity.as_str()])
    }

    fn count(&self) -> MalguardResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM signatures", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn clear(&self) -> MalguardResult<usize> {
        Ok(self.conn().execute("DELETE FROM signatures", [])?)
    }
}

impl HistorySink for SqliteStore {
    fn log(&self, result: &ScanResult) -> MalguardResult<()> {
        let sql = format!(
            "INSERT INTO scan_history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            HISTORY_COLUMNS
        );
        self.conn().execute(
            &sql,
            params![
                result.artifact_path,
                result.file_name,
                result.file_size as i64,
                result.extension,
                result.hash,
                result.detected as i64,
                result.malware_name,
                result.severity.map(|s| s.as_str()),
                result.reason.to_string(),
                result.timestamp.to_rfc3339(),
                result.from_archive,
            ],
        )?;
        Ok(())
    }

    fn recent(&self, limit: usize, detections_only: bool) -> MalguardResult<Vec<ScanResult>> {
        let filter = if detections_only { "WHERE detected = 1" } else { "" };
        let sql = format!(
            "SELECT {} FROM scan_history {} ORDER BY id DESC LIMIT ?1",
            HISTORY_COLUMNS, filter
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], history_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn stats(&self) -> MalguardResult<HistoryStats> {
        let stats = self.conn().query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(detected), 0),
                    COALESCE(SUM(reason = 'clean'), 0),
                    COALESCE(SUM(reason = 'skipped'), 0),
                    COALESCE(SUM(reason = 'hash_error' OR reason LIKE 'extraction_error%'), 0)
             FROM scan_history",
            [],
            |row| {
                Ok(HistoryStats {
                    total_scans: row.get::<_, i64>(0)? as u64,
                    detections: row.get::<_, i64>(1)? as u64,
                    clean: row.get::<_, i64>(2)? as u64,
                    skipped: row.get::<_, i64>(3)? as u64,
                    errors: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    fn clear(&self) -> MalguardResult<usize> {
        Ok(self.conn().execute("DELETE FROM scan_history", [])?)
    }
}
