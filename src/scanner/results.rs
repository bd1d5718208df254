//! Scan record persistence.
//!
//! Each record is keyed by a caller-generated scan id and moves from
//! `scanning` to `complete` (with the full result as JSON) or `failed`.

use crate::core::config::StorageConfig;
use crate::core::error::{Error, Result};
use crate::core::types::{ScanResult, ScanStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;

const SELECT_COLUMNS: &str =
    "id, filename, status, threats, scan_results, error, created_at, updated_at";

/// A stored scan and, once finished, its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub scan_id: String,
    /// Name of the uploaded file as given by the caller
    pub filename: String,
    pub status: ScanStatus,
    /// Threat list, duplicated out of `result` for cheap listing
    pub threats: Vec<String>,
    /// Full result once the scan completed
    pub result: Option<ScanResult>,
    /// Reason the scan failed
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row as stored, before JSON columns are decoded.
struct RawRecord {
    scan_id: String,
    filename: String,
    status: String,
    threats: String,
    scan_results: Option<String>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            scan_id: row.get(0)?,
            filename: row.get(1)?,
            status: row.get(2)?,
            threats: row.get(3)?,
            scan_results: row.get(4)?,
            error: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<ScanRecord> {
        let result = match self.scan_results {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        Ok(ScanRecord {
            scan_id: self.scan_id,
            filename: self.filename,
            status: ScanStatus::parse(&self.status),
            threats: serde_json::from_str(&self.threats)?,
            result,
            error: self.error,
            created_at: from_timestamp(self.created_at),
            updated_at: from_timestamp(self.updated_at),
        })
    }
}

/// Scan record storage and history manager.
pub struct ScanResultStore {
    conn: Mutex<Connection>,
}

impl ScanResultStore {
    /// Open or create a scan record store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::DatabaseInit(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| Error::DatabaseInit(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Open the default scan record store in the data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(&StorageConfig::default().database_path())
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::DatabaseInit(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scans (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                status TEXT NOT NULL,
                threats TEXT NOT NULL DEFAULT '[]',
                scan_results TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scans_created ON scans(created_at);
            "#,
        )
        .map_err(|e| Error::DatabaseInit(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::lock_poisoned("scan results database"))
    }

    /// Create a record in the `scanning` state.
    pub fn create_scan(&self, scan_id: &str, filename: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp();

        conn.execute(
            r#"
            INSERT INTO scans (id, filename, status, threats, created_at, updated_at)
            VALUES (?1, ?2, ?3, '[]', ?4, ?4)
            "#,
            params![scan_id, filename, ScanStatus::Scanning.as_str(), now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        log::debug!("Created scan record {} for {}", scan_id, filename);
        Ok(())
    }

    /// Store a finished result and mark the record `complete`.
    pub fn update_scan_results(&self, scan_id: &str, result: &ScanResult) -> Result<()> {
        let threats = serde_json::to_string(&result.threats)?;
        let scan_results = serde_json::to_string(result)?;
        let conn = self.lock()?;

        let updated = conn
            .execute(
                r#"
                UPDATE scans
                SET status = ?1, threats = ?2, scan_results = ?3, error = NULL, updated_at = ?4
                WHERE id = ?5
                "#,
                params![
                    ScanStatus::Complete.as_str(),
                    threats,
                    scan_results,
                    Utc::now().timestamp(),
                    scan_id,
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::ScanNotFound(scan_id.to_string()));
        }
        log::debug!("Stored results for scan {}", scan_id);
        Ok(())
    }

    /// Mark a record `failed` with a reason.
    pub fn mark_failed(&self, scan_id: &str, reason: &str) -> Result<()> {
        let conn = self.lock()?;

        let updated = conn
            .execute(
                "UPDATE scans SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    ScanStatus::Failed.as_str(),
                    reason,
                    Utc::now().timestamp(),
                    scan_id,
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        if updated == 0 {
            return Err(Error::ScanNotFound(scan_id.to_string()));
        }
        log::debug!("Scan {} marked failed: {}", scan_id, reason);
        Ok(())
    }

    /// Load a record by id. `None` means no such scan.
    pub fn get_scan(&self, scan_id: &str) -> Result<Option<ScanRecord>> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                &format!("SELECT {} FROM scans WHERE id = ?1", SELECT_COLUMNS),
                params![scan_id],
                RawRecord::from_row,
            )
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;

        raw.map(RawRecord::decode).transpose()
    }

    /// Most recent records first.
    pub fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM scans ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                SELECT_COLUMNS
            ))
            .map_err(|e| Error::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit as i64], RawRecord::from_row)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;

        rows.into_iter().map(RawRecord::decode).collect()
    }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{HashDigests, RiskLevel};
    use tempfile::tempdir;

    fn sample_result() -> ScanResult {
        ScanResult {
            mime_type: "application/x-php".to_string(),
            file_size: 128,
            hashes: HashDigests {
                md5: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
                sha1: "da39a3ee5e6b4b0d3255bfef95601890afd80709".to_string(),
                sha256: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
                    .to_string(),
            },
            entropy: 4.5,
            threats: vec![
                "High-risk file type detected: application/x-php".to_string(),
                "Pattern match: potential_backdoor".to_string(),
            ],
            is_malicious: true,
            risk_level: RiskLevel::High,
            detection_time: from_timestamp(1_700_000_000),
            matched_rules: vec!["potential_backdoor".to_string()],
        }
    }

    #[test]
    fn test_create_and_complete_scan() {
        let store = ScanResultStore::open_in_memory().unwrap();
        store.create_scan("scan-1", "shell.php").unwrap();

        let pending = store.get_scan("scan-1").unwrap().unwrap();
        assert_eq!(pending.status, ScanStatus::Scanning);
        assert_eq!(pending.filename, "shell.php");
        assert!(pending.threats.is_empty());
        assert!(pending.result.is_none());

        let result = sample_result();
        store.update_scan_results("scan-1", &result).unwrap();

        let done = store.get_scan("scan-1").unwrap().unwrap();
        assert_eq!(done.status, ScanStatus::Complete);
        assert_eq!(done.threats, result.threats);
        assert_eq!(done.result, Some(result));
    }

    #[test]
    fn test_unknown_scan_is_not_found() {
        let store = ScanResultStore::open_in_memory().unwrap();
        assert!(store.get_scan("missing").unwrap().is_none());
        assert!(matches!(
            store.update_scan_results("missing", &sample_result()),
            Err(Error::ScanNotFound(_))
        ));
        assert!(matches!(
            store.mark_failed("missing", "nope"),
            Err(Error::ScanNotFound(_))
        ));
    }

    #[test]
    fn test_mark_failed() {
        let store = ScanResultStore::open_in_memory().unwrap();
        store.create_scan("scan-2", "gone.bin").unwrap();
        store.mark_failed("scan-2", "Path not found: gone.bin").unwrap();

        let record = store.get_scan("scan-2").unwrap().unwrap();
        assert_eq!(record.status, ScanStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("Path not found: gone.bin"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let store = ScanResultStore::open_in_memory().unwrap();
        store.create_scan("dup", "a").unwrap();
        assert!(matches!(
            store.create_scan("dup", "b"),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn test_recent_scans() {
        let store = ScanResultStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.create_scan(&format!("scan-{}", i), "file.bin").unwrap();
        }

        let recent = store.recent_scans(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].scan_id, "scan-4");
    }

    #[test]
    fn test_persists_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("scans.db");

        {
            let store = ScanResultStore::open(&path).unwrap();
            store.create_scan("scan-disk", "report.pdf").unwrap();
            store.update_scan_results("scan-disk", &sample_result()).unwrap();
        }

        let reopened = ScanResultStore::open(&path).unwrap();
        let record = reopened.get_scan("scan-disk").unwrap().unwrap();
        assert_eq!(record.status, ScanStatus::Complete);
        assert_eq!(record.result.unwrap().matched_rules, vec!["potential_backdoor"]);
    }
}
