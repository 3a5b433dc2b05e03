//! Storage layer.
//!
//! | Store | Trait | Implementations |
//! |-------|-------|-----------------|
//! | Records | [`RecordStore`] | [`InMemoryRecordStore`] |
//! | Import logs | [`AuditLogStore`] | [`InMemoryAuditLogStore`], [`SqliteAuditLogStore`] |
//!
//! Hosts with their own database implement [`RecordStore`] over it.

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::{InMemoryAuditLogStore, InMemoryRecordStore};
pub use sqlite::SqliteAuditLogStore;
pub use traits::{AuditLogStore, RecordStore};
