use super::types::{EvolutionVersion, FailureReason, VersionStatus};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Append-only SQLite ledger of source-artifact versions.
///
/// Version numbers for Committed records are assigned inside the connection
/// lock, so they increase strictly by one per target regardless of caller
/// interleaving. Failed attempts are stored in place with status `failed` and
/// version_number 0; they never advance the tip and are never deleted.
pub struct VersionStore {
    conn: Mutex<Connection>,
}

impl VersionStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS evolution_versions (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 target_id TEXT NOT NULL,
                 version_number INTEGER NOT NULL,
                 source_hash TEXT NOT NULL,
                 instructions TEXT NOT NULL,
                 result_content TEXT NOT NULL,
                 parent_version INTEGER NOT NULL,
                 created_at TEXT NOT NULL,
                 status TEXT NOT NULL,
                 failure_reason TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_evolution_target
                 ON evolution_versions(target_id, id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Append a Committed version. The version number (tip + 1) and parent
    /// (previous tip, 0 for a root) are assigned here, atomically.
    pub fn append_committed(
        &self,
        target_id: &str,
        source_hash: &str,
        instructions: &str,
        result_content: &str,
    ) -> Result<EvolutionVersion, StoreError> {
        let conn = self.lock_connection()?;
        let tip = Self::tip_number(&conn, target_id)?;
        let version = EvolutionVersion {
            target_id: target_id.to_string(),
            version_number: tip + 1,
            source_hash: source_hash.to_string(),
            instructions: instructions.to_string(),
            result_content: result_content.to_string(),
            parent_version: tip,
            created_at: Utc::now(),
            status: VersionStatus::Committed,
            failure_reason: None,
        };
        Self::insert(&conn, &version)?;
        Ok(version)
    }

    /// Record a Failed attempt as provenance. Never advances the tip.
    pub fn append_failed(
        &self,
        target_id: &str,
        source_hash: &str,
        instructions: &str,
        result_content: &str,
        reason: &FailureReason,
    ) -> Result<EvolutionVersion, StoreError> {
        let conn = self.lock_connection()?;
        let tip = Self::tip_number(&conn, target_id)?;
        let version = EvolutionVersion {
            target_id: target_id.to_string(),
            version_number: 0,
            source_hash: source_hash.to_string(),
            instructions: instructions.to_string(),
            result_content: result_content.to_string(),
            parent_version: tip,
            created_at: Utc::now(),
            status: VersionStatus::Failed,
            failure_reason: Some(reason.to_string()),
        };
        Self::insert(&conn, &version)?;
        Ok(version)
    }

    /// The currently-active (most recent Committed) version, if any.
    pub fn tip(&self, target_id: &str) -> Result<Option<EvolutionVersion>, StoreError> {
        let conn = self.lock_connection()?;
        conn.query_row(
            "SELECT target_id, version_number, source_hash, instructions, result_content,
                    parent_version, created_at, status, failure_reason
             FROM evolution_versions
             WHERE target_id = ?1 AND status = 'committed'
             ORDER BY version_number DESC LIMIT 1",
            params![target_id],
            Self::map_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Full provenance for a target, Failed attempts included, in write order.
    pub fn history(&self, target_id: &str) -> Result<Vec<EvolutionVersion>, StoreError> {
        let conn = self.lock_connection()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, version_number, source_hash, instructions, result_content,
                    parent_version, created_at, status, failure_reason
             FROM evolution_versions WHERE target_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![target_id], Self::map_row)?
            .collect::<Result<_, _>>()?;
        Ok(rows)
    }

    /// Look up a specific Committed version.
    pub fn committed(
        &self,
        target_id: &str,
        version_number: u32,
    ) -> Result<Option<EvolutionVersion>, StoreError> {
        let conn = self.lock_connection()?;
        conn.query_row(
            "SELECT target_id, version_number, source_hash, instructions, result_content,
                    parent_version, created_at, status, failure_reason
             FROM evolution_versions
             WHERE target_id = ?1 AND version_number = ?2 AND status = 'committed'",
            params![target_id, version_number],
            Self::map_row,
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn tip_number(conn: &Connection, target_id: &str) -> Result<u32, StoreError> {
        conn.query_row(
            "SELECT COALESCE(MAX(version_number), 0) FROM evolution_versions
             WHERE target_id = ?1 AND status = 'committed'",
            params![target_id],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    fn insert(conn: &Connection, version: &EvolutionVersion) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO evolution_versions
                 (target_id, version_number, source_hash, instructions, result_content,
                  parent_version, created_at, status, failure_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                version.target_id,
                version.version_number,
                version.source_hash,
                version.instructions,
                version.result_content,
                version.parent_version,
                version.created_at.to_rfc3339(),
                match version.status {
                    VersionStatus::Committed => "committed",
                    VersionStatus::Failed => "failed",
                },
                version.failure_reason,
            ],
        )?;
        Ok(())
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EvolutionVersion> {
        let created_raw: String = row.get(6)?;
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);
        let status_raw: String = row.get(7)?;
        let status = match status_raw.as_str() {
            "committed" => VersionStatus::Committed,
            "failed" => VersionStatus::Failed,
            other => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    format!("unknown version status: {other}").into(),
                ));
            }
        };

        Ok(EvolutionVersion {
            target_id: row.get(0)?,
            version_number: row.get(1)?,
            source_hash: row.get(2)?,
            instructions: row.get(3)?,
            result_content: row.get(4)?,
            parent_version: row.get(5)?,
            created_at,
            status,
            failure_reason: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_versions_count_up_from_one() {
        let store = VersionStore::open_in_memory().unwrap();
        let v1 = store.append_committed("cli", "h1", "i1", "c1").unwrap();
        let v2 = store.append_committed("cli", "h2", "i2", "c2").unwrap();

        assert_eq!(v1.version_number, 1);
        assert_eq!(v1.parent_version, 0);
        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.parent_version, 1);
    }

    #[test]
    fn failed_records_never_advance_the_tip() {
        let store = VersionStore::open_in_memory().unwrap();
        store.append_committed("cli", "h1", "i1", "c1").unwrap();
        let failed = store
            .append_failed("cli", "h2", "i2", "", &FailureReason::EmptyResult)
            .unwrap();

        assert_eq!(failed.version_number, 0);
        assert_eq!(failed.parent_version, 1);
        assert_eq!(store.tip("cli").unwrap().unwrap().version_number, 1);

        let next = store.append_committed("cli", "h3", "i3", "c3").unwrap();
        assert_eq!(next.version_number, 2);
    }

    #[test]
    fn history_keeps_failed_provenance_in_order() {
        let store = VersionStore::open_in_memory().unwrap();
        store.append_committed("cli", "h1", "i1", "c1").unwrap();
        store
            .append_failed("cli", "h2", "i2", "bad", &FailureReason::StructurallyInvalid)
            .unwrap();
        store.append_committed("cli", "h3", "i3", "c3").unwrap();

        let history = store.history("cli").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].status, VersionStatus::Failed);
        assert_eq!(
            history[1].failure_reason.as_deref(),
            Some("structurally_invalid")
        );
    }

    #[test]
    fn targets_are_independent() {
        let store = VersionStore::open_in_memory().unwrap();
        store.append_committed("a", "h", "i", "c").unwrap();
        store.append_committed("b", "h", "i", "c").unwrap();

        assert_eq!(store.tip("a").unwrap().unwrap().version_number, 1);
        assert_eq!(store.tip("b").unwrap().unwrap().version_number, 1);
        assert!(store.tip("c").unwrap().is_none());
    }

    #[test]
    fn committed_lookup_ignores_failed_marker() {
        let store = VersionStore::open_in_memory().unwrap();
        store
            .append_failed("cli", "h", "i", "", &FailureReason::EmptyResult)
            .unwrap();
        assert!(store.committed("cli", 0).unwrap().is_none());
        assert!(store.committed("cli", 1).unwrap().is_none());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evolution.db");
        {
            let store = VersionStore::open(&path).unwrap();
            store.append_committed("cli", "h", "i", "content").unwrap();
        }
        let store = VersionStore::open(&path).unwrap();
        let tip = store.tip("cli").unwrap().unwrap();
        assert_eq!(tip.result_content, "content");
    }
}
