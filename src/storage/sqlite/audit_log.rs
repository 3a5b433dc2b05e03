//! `SQLite`-backed import log store.

use super::{acquire_lock, configure_connection, open_connection, record_operation_metrics, status_label};
use crate::models::{EntityKind, ImportLog, ImportLogId, RowError, UserId};
use crate::storage::traits::AuditLogStore;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

const BACKEND: &str = "sqlite_audit";

const SELECT_COLUMNS: &str = "id, user_id, entity_kind, file_name, row_count, success_count,
     error_count, skipped_count, errors, mapping, cancelled, created_at";

/// Durable import log store.
///
/// # Schema
///
/// One `import_logs` row per log. `errors` and `mapping` are JSON columns;
/// `created_at` is RFC 3339 UTC text with nanosecond precision, so it sorts
/// chronologically as text.
pub struct SqliteAuditLogStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

/// Raw column values of one `import_logs` row.
struct LogRow {
    id: String,
    user_id: String,
    entity_kind: String,
    file_name: String,
    row_count: i64,
    success_count: i64,
    error_count: i64,
    skipped_count: i64,
    errors: String,
    mapping: String,
    cancelled: bool,
    created_at: String,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entity_kind: row.get(2)?,
            file_name: row.get(3)?,
            row_count: row.get(4)?,
            success_count: row.get(5)?,
            error_count: row.get(6)?,
            skipped_count: row.get(7)?,
            errors: row.get(8)?,
            mapping: row.get(9)?,
            cancelled: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    fn into_log(self) -> Result<ImportLog> {
        let corrupt = |cause: String| Error::operation("decode_import_log", cause);
        let count = |v: i64| usize::try_from(v).map_err(|e| corrupt(e.to_string()));

        let entity_kind = EntityKind::parse(&self.entity_kind)
            .ok_or_else(|| corrupt(format!("unknown entity kind '{}'", self.entity_kind)))?;
        let errors: Vec<RowError> =
            serde_json::from_str(&self.errors).map_err(|e| corrupt(e.to_string()))?;
        let mapping: BTreeMap<String, String> =
            serde_json::from_str(&self.mapping).map_err(|e| corrupt(e.to_string()))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);

        Ok(ImportLog {
            id: ImportLogId::new(self.id),
            user_id: UserId::new(self.user_id),
            entity_kind,
            file_name: self.file_name,
            row_count: count(self.row_count)?,
            success_count: count(self.success_count)?,
            error_count: count(self.error_count)?,
            skipped_count: count(self.skipped_count)?,
            errors,
            mapping,
            cancelled: self.cancelled,
            created_at,
        })
    }
}

fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|e| Error::operation("encode_import_log", e))
}

impl SqliteAuditLogStore {
    /// Opens (or creates) a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::operation("open_sqlite_in_memory", e))?;
        configure_connection(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "CREATE TABLE IF NOT EXISTS import_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                file_name TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                success_count INTEGER NOT NULL,
                error_count INTEGER NOT NULL,
                skipped_count INTEGER NOT NULL DEFAULT 0,
                errors TEXT NOT NULL,
                mapping TEXT NOT NULL,
                cancelled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::operation("create_import_logs_table", e))?;

        create_user_index(&conn);
        Ok(())
    }
}

/// Creates the per-user listing index. Listing still works without it, so a
/// failure is logged rather than returned.
fn create_user_index(conn: &Connection) -> bool {
    match conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_logs_user_created
         ON import_logs(user_id, created_at DESC)",
        [],
    ) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create import log index");
            false
        },
    }
}

impl AuditLogStore for SqliteAuditLogStore {
    #[instrument(skip(self, log), fields(operation = "save", backend = BACKEND, log.id = %log.id))]
    fn save(&self, log: &ImportLog) -> Result<ImportLogId> {
        let start = Instant::now();
        let result = (|| {
            let errors = serde_json::to_string(&log.errors)
                .map_err(|e| Error::operation("encode_import_log", e))?;
            let mapping = serde_json::to_string(&log.mapping)
                .map_err(|e| Error::operation("encode_import_log", e))?;

            let conn = acquire_lock(&self.conn);
            conn.execute(
                "INSERT INTO import_logs (id, user_id, entity_kind, file_name, row_count,
                    success_count, error_count, skipped_count, errors, mapping, cancelled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    log.id.as_str(),
                    log.user_id.as_str(),
                    log.entity_kind.as_str(),
                    log.file_name,
                    to_i64(log.row_count)?,
                    to_i64(log.success_count)?,
                    to_i64(log.error_count)?,
                    to_i64(log.skipped_count)?,
                    errors,
                    mapping,
                    log.cancelled,
                    log.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
                ],
            )
            .map_err(|e| Error::operation("save_import_log", e))?;
            Ok(log.id.clone())
        })();

        record_operation_metrics(BACKEND, "save", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "list", backend = BACKEND, user.id = %user_id))]
    fn list(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<ImportLog>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM import_logs
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2 OFFSET ?3"
                ))
                .map_err(|e| Error::operation("list_import_logs", e))?;
            let rows = stmt
                .query_map(
                    params![user_id.as_str(), to_i64(limit)?, to_i64(offset)?],
                    LogRow::from_row,
                )
                .map_err(|e| Error::operation("list_import_logs", e))?;

            rows.map(|row| {
                row.map_err(|e| Error::operation("list_import_logs", e))
                    .and_then(LogRow::into_log)
            })
            .collect::<Result<Vec<_>>>()
        })();

        record_operation_metrics(BACKEND, "list", start, status_label(&result));
        result
    }

    #[instrument(skip(self), fields(operation = "get", backend = BACKEND, log.id = %id))]
    fn get(&self, id: &ImportLogId) -> Result<Option<ImportLog>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            conn.query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM import_logs WHERE id = ?1"),
                params![id.as_str()],
                LogRow::from_row,
            )
            .optional()
            .map_err(|e| Error::operation("get_import_log", e))?
            .map(LogRow::into_log)
            .transpose()
        })();

        record_operation_metrics(BACKEND, "get", start, status_label(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_user_index_failure_is_reported() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE import_logs (id TEXT PRIMARY KEY)", [])
            .unwrap();
        assert!(!create_user_index(&conn));

        let store = SqliteAuditLogStore::in_memory().unwrap();
        let conn = acquire_lock(&store.conn);
        assert!(create_user_index(&conn));
    }

    fn log(id: &str, user: &str, minutes: i64) -> ImportLog {
        let mut mapping = BTreeMap::new();
        mapping.insert("First Name".to_string(), "first_name".to_string());
        mapping.insert("Junk".to_string(), String::new());
        ImportLog {
            id: ImportLogId::new(id),
            user_id: UserId::new(user),
            entity_kind: EntityKind::Contact,
            file_name: "contacts.csv".to_string(),
            row_count: 3,
            success_count: 1,
            error_count: 1,
            skipped_count: 1,
            errors: vec![RowError::new(2, "missing required field: first_name")],
            mapping,
            cancelled: false,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_save_and_get_roundtrip() {
        let store = SqliteAuditLogStore::in_memory().unwrap();
        let original = log("l1", "u1", 0);
        let id = store.save(&original).unwrap();
        assert_eq!(id.as_str(), "l1");

        let loaded = store.get(&id).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.get(&ImportLogId::new("missing")).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let store = SqliteAuditLogStore::in_memory().unwrap();
        store.save(&log("a", "u1", 1)).unwrap();
        store.save(&log("b", "u1", 3)).unwrap();
        store.save(&log("c", "u2", 5)).unwrap();
        store.save(&log("d", "u1", 2)).unwrap();

        let ids: Vec<String> = store
            .list(&UserId::new("u1"), 10, 0)
            .unwrap()
            .iter()
            .map(|l| l.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "d", "a"]);

        let page = store.list(&UserId::new("u1"), 2, 2).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id.as_str(), "a");
    }

    #[test]
    fn test_save_is_append_only() {
        let store = SqliteAuditLogStore::in_memory().unwrap();
        store.save(&log("a", "u1", 1)).unwrap();
        let err = store.save(&log("a", "u1", 1)).unwrap_err();
        assert!(matches!(err, Error::OperationFailed { ref operation, .. } if operation == "save_import_log"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let store = SqliteAuditLogStore::new(&path).unwrap();
            store.save(&log("a", "u1", 1)).unwrap();
        }
        let store = SqliteAuditLogStore::new(&path).unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));
        assert_eq!(store.list(&UserId::new("u1"), 10, 0).unwrap().len(), 1);
    }
}
