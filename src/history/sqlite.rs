use chrono::DateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::log::{VersionFilter, VersionLog};
use super::record::{ChangeType, FileVersionRecord, NewVersion};
use crate::error::{Error, Result};

const COLUMNS: &str = "id, file_path, original_path, file_hash, change_type, timestamp, \
                       history_path, file_size, reason, is_deleted";

/// SQLite implementation of the version log
pub struct SqliteVersionLog {
    /// Path to the SQLite database file
    db_path: PathBuf,

    /// Connection to the SQLite database
    connection: Mutex<Connection>,
}

impl SqliteVersionLog {
    /// Open (or create) the database file; call `initialize` before use
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::from_io_error(e, "creating database directory", parent))?;
        }
        let connection = Connection::open(&db_path)?;
        Ok(Self {
            db_path,
            connection: Mutex::new(connection),
        })
    }

    /// In-memory database, mostly useful for tests
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db_path: PathBuf::from(":memory:"),
            connection: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| Error::HistoryRead("database connection lock poisoned".to_string()))
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileVersionRecord> {
        let change_type: String = row.get(4)?;
        let change_type = change_type.parse::<ChangeType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        let micros: i64 = row.get(5)?;
        let timestamp = DateTime::from_timestamp_micros(micros).ok_or_else(|| {
            rusqlite::Error::IntegralValueOutOfRange(5, micros)
        })?;
        let history_path: String = row.get(6)?;
        let file_size: i64 = row.get(7)?;

        Ok(FileVersionRecord {
            id: row.get(0)?,
            current_path: PathBuf::from(row.get::<_, String>(1)?),
            canonical_path: PathBuf::from(row.get::<_, String>(2)?),
            content_hash: row.get(3)?,
            change_type,
            timestamp,
            history_path: (!history_path.is_empty()).then(|| PathBuf::from(history_path)),
            file_size: file_size.max(0) as u64,
            reason: row.get(8)?,
            is_deleted: row.get(9)?,
        })
    }

    /// Translate a filter into a WHERE clause plus its bound values
    fn where_clause(filter: &VersionFilter) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(ref path) = filter.canonical_path {
            clauses.push("original_path = ?");
            values.push(Value::Text(path.to_string_lossy().into_owned()));
        }
        if let Some(ref needle) = filter.path_contains {
            clauses.push("(instr(lower(original_path), lower(?)) > 0 OR instr(lower(file_path), lower(?)) > 0)");
            values.push(Value::Text(needle.clone()));
            values.push(Value::Text(needle.clone()));
        }
        if let Some(deleted) = filter.is_deleted {
            clauses.push("is_deleted = ?");
            values.push(Value::Integer(deleted as i64));
        }
        if let Some(from) = filter.from {
            clauses.push("timestamp >= ?");
            values.push(Value::Integer(from.timestamp_micros()));
        }
        if let Some(to) = filter.to {
            clauses.push("timestamp <= ?");
            values.push(Value::Integer(to.timestamp_micros()));
        }
        if let Some(before) = filter.before {
            clauses.push("timestamp < ?");
            values.push(Value::Integer(before.timestamp_micros()));
        }
        if filter.with_snapshot {
            clauses.push("history_path <> ''");
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

impl VersionLog for SqliteVersionLog {
    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path VARCHAR(500) NOT NULL,
                original_path VARCHAR(500) NOT NULL,
                file_hash VARCHAR(64) NOT NULL DEFAULT '',
                change_type VARCHAR(20) NOT NULL,
                timestamp INTEGER NOT NULL,
                history_path VARCHAR(500) NOT NULL DEFAULT '',
                file_size INTEGER NOT NULL DEFAULT 0,
                reason VARCHAR(100) NOT NULL DEFAULT '',
                is_deleted INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_file_versions_file_path ON file_versions(file_path);
            CREATE INDEX IF NOT EXISTS idx_file_versions_original_path ON file_versions(original_path);
            CREATE INDEX IF NOT EXISTS idx_file_versions_timestamp ON file_versions(timestamp);
            CREATE INDEX IF NOT EXISTS idx_file_versions_change_type ON file_versions(change_type);
            CREATE INDEX IF NOT EXISTS idx_file_versions_is_deleted ON file_versions(is_deleted);",
        )?;

        tracing::debug!(db = %self.db_path.display(), "history schema ready");
        Ok(())
    }

    fn append(&self, version: NewVersion) -> Result<FileVersionRecord> {
        let conn = self.conn()?;
        let history_path = version
            .history_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        conn.execute(
            "INSERT INTO file_versions
                (file_path, original_path, file_hash, change_type, timestamp,
                 history_path, file_size, reason, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                version.current_path.to_string_lossy().into_owned(),
                version.canonical_path.to_string_lossy().into_owned(),
                version.content_hash,
                version.change_type.as_str(),
                version.timestamp.timestamp_micros(),
                history_path,
                version.file_size as i64,
                version.reason,
                version.change_type == ChangeType::Deleted,
            ],
        )?;

        Ok(version.into_record(conn.last_insert_rowid()))
    }

    fn query(&self, filter: &VersionFilter) -> Result<Vec<FileVersionRecord>> {
        let conn = self.conn()?;
        let (where_sql, mut values) = Self::where_clause(filter);
        let mut sql = format!(
            "SELECT {} FROM file_versions{} ORDER BY timestamp DESC, id DESC",
            COLUMNS, where_sql
        );
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_record)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn delete(&self, filter: &VersionFilter) -> Result<usize> {
        let conn = self.conn()?;
        let (where_sql, values) = Self::where_clause(filter);
        let removed = conn.execute(
            &format!("DELETE FROM file_versions{}", where_sql),
            params_from_iter(values),
        )?;
        Ok(removed)
    }
}
