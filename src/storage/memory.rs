//! In-memory stores.
//!
//! Used by hosts without a database and throughout the test suite. Records
//! are validated against the kind's schema on every write and kept in
//! insertion order.

use crate::models::{
    EntityKind, FieldMap, FieldType, FieldValue, ImportLog, ImportLogId, Record, RecordFilter,
    RecordId, UserId,
};
use crate::storage::sqlite::acquire_lock;
use crate::storage::traits::{AuditLogStore, RecordStore};
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// In-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<EntityKind, Vec<Record>>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or the fields are invalid.
    pub fn insert_with_id(
        &self,
        kind: EntityKind,
        id: impl Into<RecordId>,
        fields: FieldMap,
    ) -> Result<RecordId> {
        let id = id.into();
        let fields = prepare_create(kind, fields)?;
        let mut records = acquire_lock(&self.records);
        let list = records.entry(kind).or_default();
        if list.iter().any(|r| r.id == id) {
            return Err(Error::InvalidInput(format!(
                "{kind} record '{id}' already exists"
            )));
        }
        list.push(Record::new(id.clone(), kind, fields));
        Ok(id)
    }

    fn resolve_relations(
        records: &HashMap<EntityKind, Vec<Record>>,
        record: &Record,
    ) -> BTreeMap<String, FieldMap> {
        let mut relations = BTreeMap::new();
        for relation in record.kind.schema().relations {
            let Some(foreign_id) = record.text(relation.foreign_key) else {
                continue;
            };
            let related = records
                .get(&relation.target)
                .and_then(|list| list.iter().find(|r| r.id.as_str() == foreign_id));
            if let Some(related) = related {
                relations.insert(relation.name.to_string(), related.fields.clone());
            }
        }
        relations
    }
}

/// Checks fields against the schema, widening integers stored in float fields.
fn check_fields(kind: EntityKind, fields: FieldMap) -> Result<FieldMap> {
    let schema = kind.schema();
    fields
        .into_iter()
        .map(|(name, value)| {
            let Some(expected) = schema.field_type(&name) else {
                return Err(Error::InvalidInput(format!(
                    "unknown field '{name}' for {kind}"
                )));
            };
            let value = match (expected, value) {
                #[allow(clippy::cast_precision_loss)]
                (FieldType::Float, FieldValue::Integer(i)) => FieldValue::Float(i as f64),
                (expected, value) if value.field_type() == expected => value,
                (expected, value) => {
                    return Err(Error::InvalidInput(format!(
                        "field '{name}' expects {expected}, got {}",
                        value.field_type()
                    )));
                },
            };
            Ok((name, value))
        })
        .collect()
}

fn check_required(kind: EntityKind, fields: &FieldMap) -> Result<()> {
    let missing = crate::io::validation::check_required(kind, fields);
    match missing.first() {
        Some(issue) => Err(Error::InvalidInput(issue.message.clone())),
        None => Ok(()),
    }
}

fn prepare_create(kind: EntityKind, fields: FieldMap) -> Result<FieldMap> {
    let mut fields = check_fields(kind, fields)?;
    check_required(kind, &fields)?;
    fields
        .entry("created_at".to_string())
        .or_insert_with(|| FieldValue::Timestamp(Utc::now()));
    Ok(fields)
}

impl RecordStore for InMemoryRecordStore {
    fn create(&self, kind: EntityKind, fields: FieldMap) -> Result<RecordId> {
        let fields = prepare_create(kind, fields)?;
        let id = RecordId::generate();
        acquire_lock(&self.records)
            .entry(kind)
            .or_default()
            .push(Record::new(id.clone(), kind, fields));
        Ok(id)
    }

    fn update(&self, kind: EntityKind, id: &RecordId, fields: FieldMap) -> Result<()> {
        let fields = check_fields(kind, fields)?;
        let mut records = acquire_lock(&self.records);
        let record = records
            .get_mut(&kind)
            .and_then(|list| list.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| Error::NotFound {
                kind,
                id: id.clone(),
            })?;

        let mut merged = record.fields.clone();
        merged.extend(fields);
        check_required(kind, &merged)?;
        record.fields = merged;
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: &RecordId) -> Result<()> {
        let mut records = acquire_lock(&self.records);
        let list = records.entry(kind).or_default();
        let before = list.len();
        list.retain(|r| &r.id != id);
        if list.len() == before {
            return Err(Error::NotFound {
                kind,
                id: id.clone(),
            });
        }
        Ok(())
    }

    fn get(&self, kind: EntityKind, id: &RecordId) -> Result<Option<Record>> {
        Ok(acquire_lock(&self.records)
            .get(&kind)
            .and_then(|list| list.iter().find(|r| &r.id == id))
            .cloned())
    }

    fn find_by_key(
        &self,
        kind: EntityKind,
        key_field: &str,
        values: &BTreeSet<String>,
    ) -> Result<HashMap<String, RecordId>> {
        let records = acquire_lock(&self.records);
        let mut found = HashMap::new();
        for record in records.get(&kind).into_iter().flatten() {
            let Some(value) = record.fields.get(key_field).map(FieldValue::render) else {
                continue;
            };
            if values.contains(&value) {
                found.entry(value).or_insert_with(|| record.id.clone());
            }
        }
        Ok(found)
    }

    fn query(
        &self,
        kind: EntityKind,
        filter: &RecordFilter,
        include_relations: bool,
    ) -> Result<Vec<Record>> {
        let records = acquire_lock(&self.records);
        let matched = records
            .get(&kind)
            .into_iter()
            .flatten()
            .filter(|r| filter.matches(r))
            .map(|r| {
                let mut record = r.clone();
                if include_relations {
                    record.relations = Self::resolve_relations(&records, r);
                }
                record
            })
            .collect();
        Ok(matched)
    }

    fn count(&self, kind: EntityKind) -> Result<usize> {
        Ok(acquire_lock(&self.records).get(&kind).map_or(0, Vec::len))
    }
}

/// In-memory import log store.
#[derive(Debug, Default)]
pub struct InMemoryAuditLogStore {
    logs: Mutex<Vec<ImportLog>>,
}

impl InMemoryAuditLogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored logs across all users.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.logs).len()
    }

    /// Returns true if no log has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLogStore for InMemoryAuditLogStore {
    fn save(&self, log: &ImportLog) -> Result<ImportLogId> {
        let mut logs = acquire_lock(&self.logs);
        if logs.iter().any(|l| l.id == log.id) {
            return Err(Error::operation(
                "save_import_log",
                format!("import log '{}' already exists", log.id),
            ));
        }
        logs.push(log.clone());
        Ok(log.id.clone())
    }

    fn list(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<ImportLog>> {
        let logs = acquire_lock(&self.logs);
        let mut owned: Vec<&ImportLog> = logs.iter().rev().filter(|l| &l.user_id == user_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn get(&self, id: &ImportLogId) -> Result<Option<ImportLog>> {
        Ok(acquire_lock(&self.logs).iter().find(|l| &l.id == id).cloned())
    }
}
