//! Direct SQLite database access for infergate.
//!
//! One connection guarded by a `Mutex`; every operation acquires the lock for
//! its whole duration. The execution log is protected against UPDATE and
//! DELETE by triggers, so append-only holds even for ad-hoc SQL.

pub mod types;

pub use types::*;

use crate::error::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS context_memory (
    context_id       TEXT NOT NULL,
    principal_id     TEXT NOT NULL,
    memory_json      TEXT NOT NULL,
    preferences_json TEXT NOT NULL,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL,
    PRIMARY KEY (context_id, principal_id)
);

CREATE TABLE IF NOT EXISTS execution_log (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    command_id       TEXT NOT NULL,
    command          TEXT NOT NULL,
    parameters_json  TEXT NOT NULL,
    principal_id     TEXT NOT NULL,
    output           TEXT NOT NULL,
    timestamp        INTEGER NOT NULL,
    compliance_score REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_execution_log_command_id ON execution_log(command_id);
CREATE INDEX IF NOT EXISTS idx_execution_log_principal ON execution_log(principal_id, seq);

CREATE TRIGGER IF NOT EXISTS execution_log_no_update
BEFORE UPDATE ON execution_log
BEGIN
    SELECT RAISE(ABORT, 'execution_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS execution_log_no_delete
BEFORE DELETE ON execution_log
BEGIN
    SELECT RAISE(ABORT, 'execution_log is append-only');
END;

CREATE TABLE IF NOT EXISTS user_preferences (
    principal_id     TEXT PRIMARY KEY,
    preferences_json TEXT NOT NULL,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS principal_token (
    id           TEXT PRIMARY KEY,
    principal_id TEXT NOT NULL,
    name         TEXT NOT NULL,
    key_prefix   TEXT NOT NULL,
    key_hash     TEXT NOT NULL UNIQUE,
    last_used_at INTEGER,
    expires_at   INTEGER,
    created_at   INTEGER NOT NULL
);
"#;

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at a specific path and apply the schema
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        // Writes are durable before the call returns
        conn.pragma_update(None, "synchronous", "FULL")?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database (tests, ephemeral deployments)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Flush the write-ahead log into the main database file
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.lock()?;
        // In-memory databases report "memory" and have nothing to flush
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if mode.eq_ignore_ascii_case("wal") {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the context row for a (context, principal) pair
    pub fn get_context(&self, context_id: &str, principal_id: &str) -> Result<Option<ContextRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT context_id, principal_id, memory_json, preferences_json, created_at, updated_at
             FROM context_memory WHERE context_id = ?1 AND principal_id = ?2",
        )?;

        Ok(stmt
            .query_row(params![context_id, principal_id], Self::map_context)
            .optional()?)
    }

    fn map_context(row: &rusqlite::Row) -> rusqlite::Result<ContextRow> {
        Ok(ContextRow {
            context_id: row.get(0)?,
            principal_id: row.get(1)?,
            memory_json: row.get(2)?,
            preferences_json: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    /// Insert or overwrite a context row.
    ///
    /// `created_at` of an existing row is never overwritten.
    pub fn upsert_context(&self, row: &ContextRow) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO context_memory
             (context_id, principal_id, memory_json, preferences_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(context_id, principal_id) DO UPDATE SET
                memory_json = excluded.memory_json,
                preferences_json = excluded.preferences_json,
                updated_at = excluded.updated_at",
            params![
                row.context_id,
                row.principal_id,
                row.memory_json,
                row.preferences_json,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Delete a context row. Returns whether a row existed.
    pub fn delete_context(&self, context_id: &str, principal_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM context_memory WHERE context_id = ?1 AND principal_id = ?2",
            params![context_id, principal_id],
        )?;
        Ok(rows > 0)
    }

    /// Row counts across the memory tables
    pub fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.lock()?;
        let count = |sql: &str| -> rusqlite::Result<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
        };

        Ok(TableCounts {
            contexts: count("SELECT COUNT(*) FROM context_memory")?,
            executions: count("SELECT COUNT(*) FROM execution_log")?,
            principals: count("SELECT COUNT(*) FROM user_preferences")?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an execution record.
    ///
    /// The collision check and the insert run in one transaction under the
    /// connection lock, so two racing appends cannot both pass the check.
    pub fn append_execution(&self, record: &NewExecution) -> Result<ExecutionRow> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let conflicting: Option<String> = tx
            .query_row(
                "SELECT command FROM execution_log
                 WHERE command_id = ?1 AND command != ?2 LIMIT 1",
                params![record.command_id, record.command],
                |row| row.get(0),
            )
            .optional()?;
        if conflicting.is_some() {
            return Err(Error::duplicate_command(&record.command_id));
        }

        tx.execute(
            "INSERT INTO execution_log
             (command_id, command, parameters_json, principal_id, output, timestamp, compliance_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.command_id,
                record.command,
                record.parameters_json,
                record.principal_id,
                record.output,
                record.timestamp,
                record.compliance_score,
            ],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        Ok(ExecutionRow {
            seq,
            command_id: record.command_id.clone(),
            command: record.command.clone(),
            parameters_json: record.parameters_json.clone(),
            principal_id: record.principal_id.clone(),
            output: record.output.clone(),
            timestamp: record.timestamp,
            compliance_score: record.compliance_score,
        })
    }

    /// Count all execution records ever appended
    pub fn count_executions(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM execution_log", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Most recently appended record
    pub fn latest_execution(&self) -> Result<Option<ExecutionRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, command_id, command, parameters_json, principal_id, output,
                    timestamp, compliance_score
             FROM execution_log ORDER BY seq DESC LIMIT 1",
        )?;
        Ok(stmt.query_row([], Self::map_execution).optional()?)
    }

    /// Count the records appended on behalf of one principal
    pub fn count_principal_executions(&self, principal_id: &str) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM execution_log WHERE principal_id = ?1",
            params![principal_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// List one principal's records newest first
    pub fn list_principal_executions(&self, principal_id: &str, limit: usize) -> Result<Vec<ExecutionRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, command_id, command, parameters_json, principal_id, output,
                    timestamp, compliance_score
             FROM execution_log WHERE principal_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![principal_id, limit as i64], Self::map_execution)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All records sharing a command id, in insertion order
    pub fn get_executions(&self, command_id: &str) -> Result<Vec<ExecutionRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, command_id, command, parameters_json, principal_id, output,
                    timestamp, compliance_score
             FROM execution_log WHERE command_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![command_id], Self::map_execution)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_execution(row: &rusqlite::Row) -> rusqlite::Result<ExecutionRow> {
        Ok(ExecutionRow {
            seq: row.get(0)?,
            command_id: row.get(1)?,
            command: row.get(2)?,
            parameters_json: row.get(3)?,
            principal_id: row.get(4)?,
            output: row.get(5)?,
            timestamp: row.get(6)?,
            compliance_score: row.get(7)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Preference Operations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_preferences(&self, principal_id: &str) -> Result<Option<PreferenceRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT principal_id, preferences_json, created_at, updated_at
             FROM user_preferences WHERE principal_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![principal_id], |row| {
                Ok(PreferenceRow {
                    principal_id: row.get(0)?,
                    preferences_json: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })
            .optional()?)
    }

    pub fn upsert_preferences(&self, row: &PreferenceRow) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_preferences (principal_id, preferences_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(principal_id) DO UPDATE SET
                preferences_json = excluded.preferences_json,
                updated_at = excluded.updated_at",
            params![row.principal_id, row.preferences_json, row.created_at, row.updated_at],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principal Token Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a new principal token, returning its id
    pub fn create_principal_token(&self, token: &NewPrincipalToken) -> Result<PrincipalToken> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO principal_token
             (id, principal_id, name, key_prefix, key_hash, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                token.principal_id,
                token.name,
                token.key_prefix,
                token.key_hash,
                token.expires_at,
                now,
            ],
        )?;

        Ok(PrincipalToken {
            id,
            principal_id: token.principal_id.clone(),
            name: token.name.clone(),
            key_prefix: token.key_prefix.clone(),
            key_hash: token.key_hash.clone(),
            last_used_at: None,
            expires_at: token.expires_at,
            created_at: now,
        })
    }

    /// List tokens, optionally restricted to one principal
    pub fn list_principal_tokens(&self, principal_id: Option<&str>) -> Result<Vec<PrincipalToken>> {
        let conn = self.lock()?;
        let tokens = if let Some(pid) = principal_id {
            let mut stmt = conn.prepare(
                "SELECT id, principal_id, name, key_prefix, key_hash, last_used_at, expires_at, created_at
                 FROM principal_token WHERE principal_id = ?1 ORDER BY created_at",
            )?;
            stmt.query_map(params![pid], Self::map_token)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, principal_id, name, key_prefix, key_hash, last_used_at, expires_at, created_at
                 FROM principal_token ORDER BY created_at",
            )?;
            stmt.query_map([], Self::map_token)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(tokens)
    }

    fn map_token(row: &rusqlite::Row) -> rusqlite::Result<PrincipalToken> {
        Ok(PrincipalToken {
            id: row.get(0)?,
            principal_id: row.get(1)?,
            name: row.get(2)?,
            key_prefix: row.get(3)?,
            key_hash: row.get(4)?,
            last_used_at: row.get(5)?,
            expires_at: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    /// Update a token's last-used timestamp
    pub fn touch_principal_token(&self, token_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "UPDATE principal_token SET last_used_at = ?1 WHERE id = ?2",
            params![now, token_id],
        )?;
        Ok(())
    }

    /// Revoke a token owned by the given principal
    pub fn revoke_principal_token(&self, token_id: &str, principal_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM principal_token WHERE id = ?1 AND principal_id = ?2",
            params![token_id, principal_id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_execution(command_id: &str, command: &str) -> NewExecution {
        NewExecution {
            command_id: command_id.to_string(),
            command: command.to_string(),
            parameters_json: "{}".to_string(),
            principal_id: "p1".to_string(),
            output: "ok".to_string(),
            timestamp: 1_700_000_000_000,
            compliance_score: 1.0,
        }
    }

    #[test]
    fn test_ping_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.ping().is_ok());
        assert!(db.checkpoint().is_ok());
    }

    #[test]
    fn test_open_path_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("infergate.db");

        let db = Database::open_path(&path).unwrap();
        db.append_execution(&new_execution("cmd_1", "ping")).unwrap();
        db.checkpoint().unwrap();
        drop(db);

        let reopened = Database::open_path(&path).unwrap();
        assert_eq!(reopened.count_executions().unwrap(), 1);
    }

    #[test]
    fn test_upsert_context_preserves_created_at() {
        let db = Database::open_in_memory().unwrap();
        let mut row = ContextRow {
            context_id: "c1".into(),
            principal_id: "p1".into(),
            memory_json: "[]".into(),
            preferences_json: "{}".into(),
            created_at: 100,
            updated_at: 100,
        };
        db.upsert_context(&row).unwrap();

        row.created_at = 999;
        row.updated_at = 200;
        row.memory_json = "[1]".into();
        db.upsert_context(&row).unwrap();

        let stored = db.get_context("c1", "p1").unwrap().unwrap();
        assert_eq!(stored.created_at, 100);
        assert_eq!(stored.updated_at, 200);
        assert_eq!(stored.memory_json, "[1]");
    }

    #[test]
    fn test_context_is_scoped_by_principal() {
        let db = Database::open_in_memory().unwrap();
        let row = ContextRow {
            context_id: "shared".into(),
            principal_id: "p1".into(),
            memory_json: "[]".into(),
            preferences_json: "{}".into(),
            created_at: 1,
            updated_at: 1,
        };
        db.upsert_context(&row).unwrap();

        assert!(db.get_context("shared", "p1").unwrap().is_some());
        assert!(db.get_context("shared", "p2").unwrap().is_none());
        assert!(!db.delete_context("shared", "p2").unwrap());
        assert!(db.delete_context("shared", "p1").unwrap());
    }

    #[test]
    fn test_execution_log_rejects_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.append_execution(&new_execution("cmd_1", "ping")).unwrap();

        let conn = db.conn.lock().unwrap();
        assert!(conn
            .execute("UPDATE execution_log SET output = 'tampered'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM execution_log", []).is_err());
    }

    #[test]
    fn test_append_execution_detects_collision() {
        let db = Database::open_in_memory().unwrap();
        db.append_execution(&new_execution("cmd_same", "ping")).unwrap();

        // Re-running the same command under the same id is not a collision
        db.append_execution(&new_execution("cmd_same", "ping")).unwrap();

        let err = db
            .append_execution(&new_execution("cmd_same", "pong"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateCommandId { .. }));
        assert_eq!(db.count_executions().unwrap(), 2);
    }

    #[test]
    fn test_execution_sequence_is_monotonic() {
        let db = Database::open_in_memory().unwrap();
        let first = db.append_execution(&new_execution("cmd_a", "a")).unwrap();
        let second = db.append_execution(&new_execution("cmd_b", "b")).unwrap();

        assert!(second.seq > first.seq);
        assert_eq!(db.latest_execution().unwrap().unwrap().command_id, "cmd_b");

        let listed = db.list_principal_executions("p1", 10).unwrap();
        assert_eq!(listed[0].command_id, "cmd_b");
        assert_eq!(listed[1].command_id, "cmd_a");
    }

    #[test]
    fn test_executions_filter_by_principal() {
        let db = Database::open_in_memory().unwrap();
        db.append_execution(&new_execution("cmd_a", "a")).unwrap();
        db.append_execution(&NewExecution {
            principal_id: "p2".to_string(),
            ..new_execution("cmd_b", "b")
        })
        .unwrap();

        assert_eq!(db.count_principal_executions("p1").unwrap(), 1);
        assert_eq!(db.count_principal_executions("p3").unwrap(), 0);
        let listed = db.list_principal_executions("p2", 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].command_id, "cmd_b");
    }

    #[test]
    fn test_principal_tokens() {
        let db = Database::open_in_memory().unwrap();
        let token = db
            .create_principal_token(&NewPrincipalToken {
                principal_id: "p1".into(),
                name: "laptop".into(),
                key_prefix: "igt_abcd".into(),
                key_hash: "00ff".into(),
                expires_at: None,
            })
            .unwrap();

        assert_eq!(db.list_principal_tokens(Some("p1")).unwrap().len(), 1);
        assert!(db.list_principal_tokens(Some("p2")).unwrap().is_empty());

        db.touch_principal_token(&token.id).unwrap();
        let listed = db.list_principal_tokens(None).unwrap();
        assert!(listed[0].last_used_at.is_some());

        assert!(!db.revoke_principal_token(&token.id, "p2").unwrap());
        assert!(db.revoke_principal_token(&token.id, "p1").unwrap());
    }
}
