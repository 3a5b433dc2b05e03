//! Record import service.
//!
//! Applies a parsed CSV table to the record store one row at a time. A row
//! that fails coercion, validation or the store write is recorded in the
//! run's [`ImportLog`] and the loop moves on; only problems that make the
//! whole run meaningless (permission, mapping, the duplicate lookup, saving
//! the log) are returned as errors.

#![allow(clippy::cast_precision_loss, clippy::needless_pass_by_value)]

use super::duplicate::{DuplicateResolver, DuplicateStrategy, Resolution};
use crate::io::formats::{CsvOptions, CsvTable};
use crate::io::mapping::{ColumnMapper, ColumnMapping, ImportPreview, mapping_summary};
use crate::io::validation::{RowValidator, ValidationResult};
use crate::models::{Actor, EntityKind, FieldMap, FieldValue, ImportLog, ImportLogId, RowError};
use crate::security::{AccessControl, Permission};
use crate::storage::{AuditLogStore, RecordStore};
use crate::Result;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::instrument;

/// Shared flag for stopping a run between rows.
///
/// Clones share the flag, so one clone can be handed to the caller while
/// the run holds another.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancellationToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Options for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Kind of record the rows describe.
    pub entity_kind: EntityKind,
    /// What to do with rows matching a stored record.
    pub strategy: DuplicateStrategy,
    /// Name of the uploaded file, kept in the log.
    pub file_name: String,
    /// Checked between rows.
    pub cancellation: Option<CancellationToken>,
}

impl ImportOptions {
    /// Creates options for `entity_kind` with the default strategy.
    #[must_use]
    pub fn new(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            strategy: DuplicateStrategy::default(),
            file_name: format!("{entity_kind}.csv"),
            cancellation: None,
        }
    }

    /// Sets the duplicate strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: DuplicateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the file name recorded in the log.
    #[must_use]
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Progress callback for import runs.
pub type ProgressCallback = Box<dyn Fn(&ImportProgress) + Send>;

/// Progress information during an import run.
#[derive(Debug, Clone, Default)]
pub struct ImportProgress {
    /// Rows processed so far.
    pub processed: usize,
    /// Rows written to the store.
    pub succeeded: usize,
    /// Rows that failed.
    pub failed: usize,
    /// Rows skipped as duplicates.
    pub skipped: usize,
    /// Number of data rows in the table.
    pub total: usize,
    /// File position of the row just processed (1-indexed, counting rows
    /// dropped while parsing).
    pub current_row: usize,
}

impl ImportProgress {
    /// Returns the percentage complete (0-100).
    #[must_use]
    pub fn percent_complete(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f32 / self.total as f32) * 100.0
        }
    }
}

/// What happened to one row.
enum RowOutcome {
    Created,
    Updated,
    Skipped,
}

/// Service for importing records from CSV tables.
pub struct ImportService {
    records: Arc<dyn RecordStore>,
    audit: Arc<dyn AuditLogStore>,
    access: AccessControl,
    mapper: ColumnMapper,
    csv_options: CsvOptions,
}

impl ImportService {
    /// Creates an import service with default access rules and parsing.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>, audit: Arc<dyn AuditLogStore>) -> Self {
        Self {
            records,
            audit,
            access: AccessControl::new(),
            mapper: ColumnMapper::new(),
            csv_options: CsvOptions::default(),
        }
    }

    /// Replaces the access rules.
    #[must_use]
    pub fn with_access_control(mut self, access: AccessControl) -> Self {
        self.access = access;
        self
    }

    /// Replaces the column mapper.
    #[must_use]
    pub const fn with_mapper(mut self, mapper: ColumnMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Replaces the CSV parsing options.
    #[must_use]
    pub const fn with_csv_options(mut self, csv_options: CsvOptions) -> Self {
        self.csv_options = csv_options;
        self
    }

    /// Parses an upload with the configured delimiter and row limit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Upload`] if the text cannot be used.
    pub fn parse(&self, raw: &str) -> Result<CsvTable> {
        CsvTable::parse_with(raw, self.csv_options)
    }

    /// Infers a mapping and counts rows whose key already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor may not import or the duplicate
    /// lookup fails.
    #[instrument(skip(self, table, actor), fields(entity_kind = %kind, rows = table.row_count()))]
    pub fn preview(&self, table: &CsvTable, kind: EntityKind, actor: &Actor) -> Result<ImportPreview> {
        self.access.require(actor, Permission::Import, "import")?;

        let mut preview = self.mapper.infer_mapping(table, kind);
        let validator = RowValidator::new(kind, table.headers(), &preview.mapping);
        if validator.maps_field(kind.duplicate_key()) {
            let keys: Vec<Option<String>> = table
                .rows()
                .iter()
                .map(|row| duplicate_key(kind, &validator.validate(row).fields))
                .collect();
            let distinct: BTreeSet<String> = keys.iter().flatten().cloned().collect();
            let existing = DuplicateResolver::find_existing(self.records.as_ref(), kind, &distinct)?;
            preview.duplicate_count = keys
                .iter()
                .flatten()
                .filter(|key| existing.contains_key(*key))
                .count();
        }
        Ok(preview)
    }

    /// Parses, infers a mapping and runs the import in one call.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload cannot be parsed or the run fails
    /// before processing rows.
    pub fn import_text(
        &self,
        raw: &str,
        options: &ImportOptions,
        actor: &Actor,
    ) -> Result<ImportLog> {
        let table = self.parse(raw)?;
        let preview = self.mapper.infer_mapping(&table, options.entity_kind);
        self.run(&table, &preview.mapping, options, actor, None)
    }

    /// Runs an import.
    ///
    /// Rows are processed in file order; row numbers in the log are 1-based
    /// data row numbers. Exactly one log is saved per run that reaches the
    /// row loop, including cancelled runs.
    ///
    /// # Errors
    ///
    /// Returns an error (and saves no log) if the actor may not import, the
    /// mapping is invalid, the duplicate lookup fails or the log cannot be
    /// saved.
    #[instrument(
        skip(self, table, mapping, options, actor, progress),
        fields(
            entity_kind = %options.entity_kind,
            strategy = %options.strategy,
            rows = table.row_count(),
            user.id = %actor.id
        )
    )]
    pub fn run(
        &self,
        table: &CsvTable,
        mapping: &[ColumnMapping],
        options: &ImportOptions,
        actor: &Actor,
        progress: Option<ProgressCallback>,
    ) -> Result<ImportLog> {
        let start = Instant::now();
        let kind = options.entity_kind;

        self.access.require(actor, Permission::Import, "import")?;
        ColumnMapper::validate(mapping, kind)?;
        ColumnMapper::validate_columns(mapping, table.headers())?;

        let validator = RowValidator::new(kind, table.headers(), mapping);
        let validated: Vec<ValidationResult> =
            table.rows().iter().map(|row| validator.validate(row)).collect();
        let keys: BTreeSet<String> = validated
            .iter()
            .filter(|result| result.is_valid())
            .filter_map(|result| duplicate_key(kind, &result.fields))
            .collect();
        let mut resolver =
            DuplicateResolver::prepare(self.records.as_ref(), kind, options.strategy, &keys)?;
        let stamp_owner = !validator.maps_field("owner_id");

        let mut prog = ImportProgress {
            total: table.row_count(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        let mut cancelled = false;

        for (index, result) in validated.into_iter().enumerate() {
            if options.is_cancelled() {
                cancelled = true;
                tracing::info!(processed = prog.processed, "Import cancelled");
                break;
            }
            let row = table.source_row(index).unwrap_or(index + 1);
            prog.current_row = row;
            prog.processed += 1;

            if result.warning_count() > 0 {
                tracing::debug!(row, warnings = result.warning_count(), "Row coerced with warnings");
            }

            let outcome = match result.error_message() {
                Some(message) => Err(message),
                None => self
                    .apply_row(kind, result.fields, &mut resolver, actor, stamp_owner)
                    .map_err(|e| e.to_string()),
            };

            match outcome {
                Ok(RowOutcome::Created | RowOutcome::Updated) => prog.succeeded += 1,
                Ok(RowOutcome::Skipped) => prog.skipped += 1,
                Err(message) => {
                    tracing::debug!(row, error = %message, "Row failed");
                    prog.failed += 1;
                    errors.push(RowError::new(row, message));
                },
            }

            if let Some(ref cb) = progress {
                cb(&prog);
            }
        }

        let log = ImportLog {
            id: ImportLogId::generate(),
            user_id: actor.id.clone(),
            entity_kind: kind,
            file_name: options.file_name.clone(),
            row_count: table.row_count(),
            success_count: prog.succeeded,
            error_count: prog.failed,
            skipped_count: prog.skipped,
            errors,
            mapping: mapping_summary(mapping),
            cancelled,
            created_at: Utc::now(),
        };
        self.audit.save(&log)?;

        let kind_label = kind.as_str();
        metrics::counter!("import_rows_total", "entity_kind" => kind_label, "outcome" => "success")
            .increment(log.success_count as u64);
        metrics::counter!("import_rows_total", "entity_kind" => kind_label, "outcome" => "error")
            .increment(log.error_count as u64);
        metrics::counter!("import_rows_total", "entity_kind" => kind_label, "outcome" => "skipped")
            .increment(log.skipped_count as u64);
        metrics::histogram!("import_duration_ms", "entity_kind" => kind_label)
            .record(start.elapsed().as_secs_f64() * 1000.0);

        tracing::info!(
            log.id = %log.id,
            success = log.success_count,
            errors = log.error_count,
            skipped = log.skipped_count,
            cancelled = log.cancelled,
            duration_ms = start.elapsed().as_millis(),
            "Import finished"
        );
        Ok(log)
    }

    /// Lists the actor's own import logs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor may not view logs or the store fails.
    pub fn list_logs(&self, actor: &Actor, limit: usize, offset: usize) -> Result<Vec<ImportLog>> {
        self.access
            .require(actor, Permission::ViewImportLogs, "list import logs")?;
        self.audit.list(&actor.id, limit, offset)
    }

    /// Fetches one of the actor's import logs.
    ///
    /// Logs owned by other users are reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor may not view logs or the store fails.
    pub fn get_log(&self, actor: &Actor, id: &ImportLogId) -> Result<Option<ImportLog>> {
        self.access
            .require(actor, Permission::ViewImportLogs, "view import log")?;
        Ok(self.audit.get(id)?.filter(|log| log.user_id == actor.id))
    }

    fn apply_row(
        &self,
        kind: EntityKind,
        mut fields: FieldMap,
        resolver: &mut DuplicateResolver,
        actor: &Actor,
        stamp_owner: bool,
    ) -> Result<RowOutcome> {
        let key = duplicate_key(kind, &fields);
        match resolver.resolve_key(key.as_deref()) {
            Resolution::Skip(_) => Ok(RowOutcome::Skipped),
            Resolution::UpdateRecord(id) => {
                self.records.update(kind, &id, fields)?;
                Ok(RowOutcome::Updated)
            },
            Resolution::CreateRecord => {
                let actor_id = FieldValue::Text(actor.id.to_string());
                if stamp_owner {
                    fields.insert("owner_id".to_string(), actor_id.clone());
                }
                fields.insert("created_by".to_string(), actor_id);
                let id = self.records.create(kind, fields)?;
                if let Some(key) = key {
                    resolver.remember(&key, id);
                }
                Ok(RowOutcome::Created)
            },
        }
    }
}

/// Rendered duplicate key of a coerced row, if present and non-blank.
fn duplicate_key(kind: EntityKind, fields: &FieldMap) -> Option<String> {
    fields
        .get(kind.duplicate_key())
        .map(FieldValue::render)
        .filter(|key| !key.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mapping::{MappingError, mapping_from_pairs};
    use crate::Error;
    use crate::models::RecordFilter;
    use crate::security::Role;
    use crate::storage::memory::InMemoryAuditLogStore;
    use crate::storage::InMemoryRecordStore;
    use std::sync::Mutex;

    struct Fixture {
        records: Arc<InMemoryRecordStore>,
        audit: Arc<InMemoryAuditLogStore>,
        service: ImportService,
    }

    fn fixture() -> Fixture {
        let records = Arc::new(InMemoryRecordStore::new());
        let audit = Arc::new(InMemoryAuditLogStore::new());
        let service = ImportService::new(records.clone(), audit.clone());
        Fixture {
            records,
            audit,
            service,
        }
    }

    fn member() -> Actor {
        Actor::new("u1", Role::Member)
    }

    fn contact_mapping() -> Vec<ColumnMapping> {
        mapping_from_pairs(
            EntityKind::Contact,
            &[
                ("First Name", "first_name"),
                ("Last Name", "last_name"),
                ("Email", "email"),
            ],
        )
    }

    #[test]
    fn test_missing_first_name_is_row_error() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Last Name,Email\nJane,Doe,jane@x.com\n,Smith,bad")
            .unwrap();
        let log = f
            .service
            .run(
                &table,
                &contact_mapping(),
                &ImportOptions::new(EntityKind::Contact),
                &member(),
                None,
            )
            .unwrap();

        assert_eq!(log.row_count, 2);
        assert_eq!(log.success_count, 1);
        assert_eq!(log.error_count, 1);
        assert_eq!(log.errors[0].row, 2);
        assert!(log.errors[0].message.contains("first_name"));
        assert_eq!(f.audit.len(), 1);
    }

    #[test]
    fn test_create_stamps_actor() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Last Name\nJane,Doe").unwrap();
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("First Name", "first_name"), ("Last Name", "last_name")],
        );
        f.service
            .run(&table, &mapping, &ImportOptions::new(EntityKind::Contact), &member(), None)
            .unwrap();

        let records = f
            .records
            .query(EntityKind::Contact, &RecordFilter::new(), false)
            .unwrap();
        assert_eq!(records[0].text("created_by"), Some("u1"));
        assert_eq!(records[0].text("owner_id"), Some("u1"));
    }

    #[test]
    fn test_mapped_owner_is_kept() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Last Name,Owner\nJane,Doe,u9").unwrap();
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[
                ("First Name", "first_name"),
                ("Last Name", "last_name"),
                ("Owner", "owner_id"),
            ],
        );
        f.service
            .run(&table, &mapping, &ImportOptions::new(EntityKind::Contact), &member(), None)
            .unwrap();
        let records = f
            .records
            .query(EntityKind::Contact, &RecordFilter::new(), false)
            .unwrap();
        assert_eq!(records[0].text("owner_id"), Some("u9"));
    }

    #[test]
    fn test_mapping_error_saves_no_log() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Email\nJane,jane@x.com").unwrap();
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("First Name", "first_name"), ("Email", "email")],
        );
        let err = f
            .service
            .run(&table, &mapping, &ImportOptions::new(EntityKind::Contact), &member(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
        assert!(f.audit.is_empty());
    }

    #[test]
    fn test_unknown_source_column_saves_no_log() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Last Name\nJane,Doe\nJohn,Smith").unwrap();
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("Fname", "first_name"), ("Last Name", "last_name")],
        );
        let err = f
            .service
            .run(&table, &mapping, &ImportOptions::new(EntityKind::Contact), &member(), None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Mapping(MappingError::UnknownColumn { ref column }) if column == "Fname"
        ));
        assert!(f.audit.is_empty());
        assert_eq!(f.records.count(EntityKind::Contact).unwrap(), 0);
    }

    #[test]
    fn test_row_numbers_count_dropped_rows() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Last Name\n,\nJane,Doe\n,Smith\n").unwrap();
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("First Name", "first_name"), ("Last Name", "last_name")],
        );
        let log = f
            .service
            .run(
                &table,
                &mapping,
                &ImportOptions::new(EntityKind::Contact).with_strategy(DuplicateStrategy::CreateNew),
                &member(),
                None,
            )
            .unwrap();

        assert_eq!(log.success_count, 1);
        assert_eq!(log.error_count, 1);
        assert_eq!(log.errors[0].row, 3);
        assert!(log.errors[0].message.contains("first_name"));
    }

    #[test]
    fn test_viewer_cannot_import() {
        let f = fixture();
        let table = CsvTable::parse("First Name,Last Name\nJane,Doe").unwrap();
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("First Name", "first_name"), ("Last Name", "last_name")],
        );
        let err = f
            .service
            .run(
                &table,
                &mapping,
                &ImportOptions::new(EntityKind::Contact),
                &Actor::new("v", Role::Viewer),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
        assert!(f.audit.is_empty());
    }

    #[test]
    fn test_same_key_twice_in_one_file_is_skipped() {
        let f = fixture();
        let table = CsvTable::parse(
            "First Name,Last Name,Email\nJane,Doe,jane@x.com\nJanet,Doe,jane@x.com",
        )
        .unwrap();
        let log = f
            .service
            .run(
                &table,
                &contact_mapping(),
                &ImportOptions::new(EntityKind::Contact),
                &member(),
                None,
            )
            .unwrap();
        assert_eq!(log.success_count, 1);
        assert_eq!(log.skipped_count, 1);
        assert_eq!(f.records.count(EntityKind::Contact).unwrap(), 1);
    }

    #[test]
    fn test_progress_and_cancellation() {
        let f = fixture();
        let table = CsvTable::parse(
            "First Name,Last Name,Email\nA,One,a@x.com\nB,Two,b@x.com\nC,Three,c@x.com",
        )
        .unwrap();
        let token = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let cb_token = token.clone();
        let cb_seen = Arc::clone(&seen);
        let progress: ProgressCallback = Box::new(move |p: &ImportProgress| {
            cb_seen.lock().unwrap().push(p.current_row);
            if p.processed == 1 {
                cb_token.cancel();
            }
        });

        let log = f
            .service
            .run(
                &table,
                &contact_mapping(),
                &ImportOptions::new(EntityKind::Contact).with_cancellation(token),
                &member(),
                Some(progress),
            )
            .unwrap();

        assert!(log.cancelled);
        assert_eq!(log.row_count, 3);
        assert_eq!(log.processed(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(f.audit.len(), 1);
    }

    #[test]
    fn test_preview_counts_duplicates() {
        let f = fixture();
        let actor = member();
        f.service
            .import_text(
                "First Name,Last Name,Email\nJane,Doe,jane@x.com",
                &ImportOptions::new(EntityKind::Contact),
                &actor,
            )
            .unwrap();

        let table = CsvTable::parse(
            "First Name,Last Name,Email\nJane,Doe,jane@x.com\nBob,Roe,bob@x.com",
        )
        .unwrap();
        let preview = f.service.preview(&table, EntityKind::Contact, &actor).unwrap();
        assert_eq!(preview.total_rows, 2);
        assert_eq!(preview.duplicate_count, 1);
    }

    #[test]
    fn test_logs_are_scoped_to_actor() {
        let f = fixture();
        let alice = Actor::new("alice", Role::Member);
        let bob = Actor::new("bob", Role::Member);
        let log = f
            .service
            .import_text(
                "First Name,Last Name\nJane,Doe",
                &ImportOptions::new(EntityKind::Contact),
                &alice,
            )
            .unwrap();

        assert_eq!(f.service.list_logs(&alice, 10, 0).unwrap().len(), 1);
        assert!(f.service.list_logs(&bob, 10, 0).unwrap().is_empty());
        assert!(f.service.get_log(&bob, &log.id).unwrap().is_none());
        assert_eq!(f.service.get_log(&alice, &log.id).unwrap().unwrap().id, log.id);
    }

    #[test]
    fn test_percent_complete() {
        let prog = ImportProgress {
            processed: 1,
            total: 4,
            ..Default::default()
        };
        assert!((prog.percent_complete() - 25.0).abs() < f32::EPSILON);
        assert!((ImportProgress::default().percent_complete() - 100.0).abs() < f32::EPSILON);
    }
}
