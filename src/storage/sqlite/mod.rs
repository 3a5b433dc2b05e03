//! `SQLite` infrastructure and the durable import log store.
//!
//! - [`connection`]: lock acquisition with poison recovery, pragma setup
//! - [`metrics`]: store operation metrics
//! - [`audit_log`]: [`SqliteAuditLogStore`]

mod audit_log;
mod connection;
mod metrics;

pub use audit_log::SqliteAuditLogStore;
pub use connection::{BUSY_TIMEOUT_MS, acquire_lock, configure_connection, open_connection};
pub use metrics::{record_operation_metrics, status_label};
