//! Import audit log store trait.

use crate::Result;
use crate::models::{ImportLog, ImportLogId, UserId};

/// Append-only persistence for [`ImportLog`]s.
///
/// Logs are never updated or deleted once saved.
pub trait AuditLogStore: Send + Sync {
    /// Persists a log and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be written, including when a log
    /// with the same id already exists.
    fn save(&self, log: &ImportLog) -> Result<ImportLogId>;

    /// Lists a user's logs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs cannot be read.
    fn list(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<ImportLog>>;

    /// Retrieves a log by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn get(&self, id: &ImportLogId) -> Result<Option<ImportLog>>;
}
