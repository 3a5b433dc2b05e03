//! # CRM Transfer
//!
//! CSV import/export and bulk mutation engine for CRM records.
//!
//! The engine moves contacts, organizations and deals in and out of a
//! record store:
//!
//! - **Import**: parse a user-supplied CSV file, infer a column mapping,
//!   resolve duplicates against the store and apply row-level creates and
//!   updates. A bad row is recorded in the import log, never fatal.
//! - **Export**: render a filtered record set as CSV with selectable field
//!   paths, relation flattening and header formatting.
//! - **Bulk actions**: assign, tag, change status, move stage, delete or
//!   export an arbitrary set of selected records, gated by role.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crm_transfer::io::{CsvTable, ColumnMapper, ImportService, ImportOptions};
//! use crm_transfer::{Actor, EntityKind, Role};
//!
//! let table = CsvTable::parse(&raw_text)?;
//! let preview = ColumnMapper::new().infer_mapping(&table, EntityKind::Contact);
//! let log = service.run(&table, &preview.mapping, &ImportOptions::new(EntityKind::Contact), &actor, None)?;
//! println!("{} imported, {} failed", log.success_count, log.error_count);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::TransferConfig;
pub use io::MappingError;
pub use models::{
    Actor, EntityKind, FieldMap, FieldType, FieldValue, ImportLog, Record, RecordFilter, RecordId,
    RowError, UserId,
};
pub use security::{AccessControl, Permission, Role};
pub use services::{BulkAction, BulkActionRequest, BulkOutcome, BulkReport, BulkService};
pub use storage::{AuditLogStore, InMemoryRecordStore, RecordStore};

/// Error type for engine operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed action payloads, empty id sets, bad filter syntax |
/// | `Upload` | Unreadable or malformed CSV, too few lines, too many rows |
/// | `Mapping` | Required fields unmapped, two columns claiming one field |
/// | `PermissionDenied` | Bulk delete by a non-elevated role, missing permission |
/// | `Unauthorized` | No acting user available |
/// | `NotFound` | A targeted record does not exist in the store |
/// | `OperationFailed` | Store rejections, `SQLite` and I/O failures |
///
/// Row-level import failures are never raised as errors: they are
/// collected into [`ImportLog::errors`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The uploaded file could not be turned into a table.
    ///
    /// Raised before any row is processed; no import log is written.
    #[error("upload rejected: {0}")]
    Upload(String),

    /// The column mapping is not usable for the target entity kind.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// The acting user lacks the permission for an action.
    #[error("permission denied for '{action}': {reason}")]
    PermissionDenied {
        /// The action that was attempted.
        action: String,
        /// Why it was refused.
        reason: String,
    },

    /// No authenticated user is available.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A record does not exist.
    #[error("{kind} record '{id}' not found")]
    NotFound {
        /// Entity kind of the missing record.
        kind: EntityKind,
        /// Record identifier.
        id: RecordId,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - The record store rejects a write or a query
    /// - `SQLite` operations fail
    /// - Filesystem I/O errors occur
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and cause.
    pub fn operation(operation: &str, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "create".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'create' failed: failed");

        let err = Error::PermissionDenied {
            action: "delete".to_string(),
            reason: "admin role required".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "permission denied for 'delete': admin role required"
        );

        let err = Error::NotFound {
            kind: EntityKind::Deal,
            id: RecordId::new("d1"),
        };
        assert_eq!(err.to_string(), "deals record 'd1' not found");
    }

    #[test]
    fn test_mapping_error_is_transparent() {
        let err: Error = MappingError::MissingRequiredFields(vec!["name".to_string()]).into();
        assert!(err.to_string().contains("name"));
    }
}
