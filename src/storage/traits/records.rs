//! Record store trait.

use crate::Result;
use crate::models::{EntityKind, FieldMap, Record, RecordFilter, RecordId};
use std::collections::{BTreeSet, HashMap};

/// Typed CRUD access to contacts, organizations and deals.
///
/// The engine never caches records across calls; a store is expected to
/// serialize concurrent writes to the same record itself.
pub trait RecordStore: Send + Sync {
    /// Creates a record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the fields.
    fn create(&self, kind: EntityKind, fields: FieldMap) -> Result<RecordId>;

    /// Merges `fields` into an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the record does not exist, or
    /// an error if the store rejects the fields.
    fn update(&self, kind: EntityKind, id: &RecordId, fields: FieldMap) -> Result<()>;

    /// Deletes a record permanently.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the record does not exist.
    fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<()>;

    /// Retrieves a record without relations.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<Record>>;

    /// Maps each value of `key_field` found among `values` to a record id.
    ///
    /// Values with no matching record are absent from the result. When
    /// several records share a value the earliest one is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn find_by_key(
        &self,
        kind: EntityKind,
        key_field: &str,
        values: &BTreeSet<String>,
    ) -> Result<HashMap<String, RecordId>>;

    /// Returns matching records in the store's natural order.
    ///
    /// Relations are resolved only when `include_relations` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn query(
        &self,
        kind: EntityKind,
        filter: &RecordFilter,
        include_relations: bool,
    ) -> Result<Vec<Record>>;

    /// Returns the number of records of a kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count(&self, kind: EntityKind) -> Result<usize> {
        Ok(self.query(kind, &RecordFilter::new(), false)?.len())
    }
}
