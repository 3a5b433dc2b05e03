//! Import audit records.

use super::{EntityKind, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for an import log (time-ordered UUID v7).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImportLogId(String);

impl ImportLogId {
    /// Creates an import log ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImportLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImportLogId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A failed data row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row number (the header row is not counted).
    pub row: usize,
    /// Human-readable failure reason.
    pub message: String,
}

impl RowError {
    /// Creates a row error.
    #[must_use]
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Durable summary of one import attempt.
///
/// Written once at the end of a run (including runs with row errors and
/// cancelled runs) and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLog {
    /// Log identifier.
    pub id: ImportLogId,
    /// User who ran the import.
    pub user_id: UserId,
    /// Kind of records imported.
    pub entity_kind: EntityKind,
    /// Name of the uploaded file.
    pub file_name: String,
    /// Number of parsed data rows.
    pub row_count: usize,
    /// Rows created or updated.
    pub success_count: usize,
    /// Rows that failed.
    pub error_count: usize,
    /// Rows skipped as duplicates.
    pub skipped_count: usize,
    /// Per-row failures in file order.
    pub errors: Vec<RowError>,
    /// Finalized mapping, source header to target field (empty = not imported).
    pub mapping: BTreeMap<String, String>,
    /// Whether the run was stopped before the last row.
    pub cancelled: bool,
    /// When the run finished.
    pub created_at: DateTime<Utc>,
}

impl ImportLog {
    /// Number of rows the run reached (succeeded, failed or skipped).
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.success_count + self.error_count + self.skipped_count
    }

    /// Returns true if every processed row succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_error_display() {
        let err = RowError::new(2, "missing required field: first_name");
        assert_eq!(err.to_string(), "Row 2: missing required field: first_name");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(ImportLogId::generate(), ImportLogId::generate());
    }

    #[test]
    fn test_processed() {
        let log = ImportLog {
            id: ImportLogId::new("l1"),
            user_id: UserId::new("u1"),
            entity_kind: EntityKind::Contact,
            file_name: "contacts.csv".to_string(),
            row_count: 5,
            success_count: 2,
            error_count: 1,
            skipped_count: 1,
            errors: vec![RowError::new(3, "bad")],
            mapping: BTreeMap::new(),
            cancelled: true,
            created_at: Utc::now(),
        };
        assert_eq!(log.processed(), 4);
        assert!(!log.is_clean());
    }
}
