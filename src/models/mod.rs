//! Data models for CRM transfer.
//!
//! This module contains the record, schema, filter and audit types shared
//! by the import, export and bulk paths.

mod actor;
mod entity;
mod filter;
mod import_log;
pub mod schema;
mod value;

pub use actor::{Actor, IdentityProvider, StaticIdentity, UserId, require_actor};
pub use entity::{EntityKind, Record, RecordId};
pub use filter::{FilterCondition, RecordFilter};
pub use import_log::{ImportLog, ImportLogId, RowError};
pub use schema::{EntitySchema, FieldSpec, RelationSpec};
pub use value::{FieldMap, FieldType, FieldValue, TAG_SEPARATOR};
