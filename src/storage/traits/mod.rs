//! Storage traits.

mod audit;
mod records;

pub use audit::AuditLogStore;
pub use records::RecordStore;
