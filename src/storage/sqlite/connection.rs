//! Connection and lock handling shared by the stores.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Milliseconds `SQLite` waits on a locked database before failing.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Locks a store mutex, recovering the data if a previous holder panicked.
///
/// Every store write is a single statement or a single `Vec` mutation, so
/// the guarded state stays consistent even when poisoned.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Store mutex was poisoned, recovering");
            metrics::counter!("store_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL sync and a busy timeout.
///
/// Pragma results are ignored: in-memory databases report `memory` as
/// their journal mode and that is not an error.
///
/// # Errors
///
/// Never fails at present; pragma errors are ignored.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", BUSY_TIMEOUT_MS);
    Ok(())
}

/// Opens a database file, creating its parent directory first.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory or the database
/// cannot be created.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_db_dir", e))?;
    }
    let conn = Connection::open(path).map_err(|e| Error::operation("open_sqlite", e))?;
    configure_connection(&conn)?;
    Ok(conn)
}
