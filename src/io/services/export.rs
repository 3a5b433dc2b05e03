//! Record export service.
//!
//! Renders a filtered record set as CSV: one header line, one line per
//! record in the store's natural order.

use crate::io::field_path::{FieldPath, HeaderFormat};
use crate::io::formats::CsvExportSink;
use crate::models::{Actor, EntityKind, RecordFilter};
use crate::security::{AccessControl, Permission};
use crate::storage::RecordStore;
use crate::{Error, Result};
use chrono::{NaiveDate, Utc};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Options for a record export.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Kind of record to export.
    pub entity_kind: EntityKind,
    /// Field paths, one column each. Empty means the kind's default list.
    pub fields: Vec<String>,
    /// Which records to export.
    pub filter: RecordFilter,
    /// Load related records so dotted paths resolve.
    pub include_relations: bool,
    /// How header cells are rendered.
    pub header_format: HeaderFormat,
    /// Maximum number of records to export.
    pub limit: Option<usize>,
}

impl ExportOptions {
    /// Creates options exporting every record of `entity_kind` with the
    /// default field list.
    #[must_use]
    pub fn new(entity_kind: EntityKind) -> Self {
        Self {
            entity_kind,
            fields: Vec::new(),
            filter: RecordFilter::new(),
            include_relations: false,
            header_format: HeaderFormat::default(),
            limit: None,
        }
    }

    /// Sets the field paths.
    #[must_use]
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the record filter.
    #[must_use]
    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Parses and sets a filter query (`status:lead tag:vip name~acme`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for malformed queries.
    pub fn with_query(self, query: &str) -> Result<Self> {
        Ok(self.with_filter(RecordFilter::parse(query)?))
    }

    /// Enables or disables relation loading.
    #[must_use]
    pub const fn with_relations(mut self, include_relations: bool) -> Self {
        self.include_relations = include_relations;
        self
    }

    /// Sets the header format.
    #[must_use]
    pub const fn with_header_format(mut self, header_format: HeaderFormat) -> Self {
        self.header_format = header_format;
        self
    }

    /// Sets the maximum number of records to export.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resolves the field list into checked paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a path is malformed or names a
    /// field or relation the kind does not have.
    pub fn field_paths(&self) -> Result<Vec<FieldPath>> {
        let paths: Vec<FieldPath> = if self.fields.is_empty() {
            self.entity_kind
                .schema()
                .default_export_fields
                .iter()
                .map(|field| FieldPath::parse(field))
                .collect::<Result<_>>()?
        } else {
            self.fields
                .iter()
                .map(|field| FieldPath::parse(field))
                .collect::<Result<_>>()?
        };
        for path in &paths {
            path.check(self.entity_kind)?;
        }
        Ok(paths)
    }

    /// Relation paths that will render empty because relations are not
    /// loaded.
    #[must_use]
    pub fn unloaded_relation_paths<'a>(&self, paths: &'a [FieldPath]) -> Vec<&'a FieldPath> {
        if self.include_relations {
            return Vec::new();
        }
        paths.iter().filter(|path| path.is_relation()).collect()
    }
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// The CSV text.
    pub csv: String,
    /// Suggested download name.
    pub file_name: String,
    /// Number of data lines written.
    pub exported: usize,
}

impl ExportResult {
    /// Returns whether any records were exported.
    #[must_use]
    pub const fn has_exports(&self) -> bool {
        self.exported > 0
    }
}

/// Progress callback for exports: records written so far and the total.
pub type ExportProgressCallback = Box<dyn Fn(usize, usize) + Send>;

/// Builds the download name `{kind}_export_{YYYY-MM-DD}.csv`.
#[must_use]
pub fn file_name(kind: EntityKind, date: NaiveDate) -> String {
    format!("{}_export_{}.csv", kind.as_str(), date.format("%Y-%m-%d"))
}

/// Service for exporting records to CSV.
pub struct ExportService {
    records: Arc<dyn RecordStore>,
    access: AccessControl,
}

impl ExportService {
    /// Creates an export service with default access rules.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            access: AccessControl::new(),
        }
    }

    /// Replaces the access rules.
    #[must_use]
    pub fn with_access_control(mut self, access: AccessControl) -> Self {
        self.access = access;
        self
    }

    /// Exports records to CSV text.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor may not export, a field path is
    /// invalid or the store query fails.
    pub fn export(&self, options: &ExportOptions, actor: &Actor) -> Result<ExportResult> {
        let mut buffer = Vec::new();
        let exported = self.export_to_writer(&mut buffer, options, actor, None)?;
        let csv = String::from_utf8(buffer).map_err(|e| Error::operation("encode_csv", e))?;
        Ok(ExportResult {
            csv,
            file_name: file_name(options.entity_kind, Utc::now().date_naive()),
            exported,
        })
    }

    /// Exports records to a file, returning the number written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the export fails.
    pub fn export_to_file(
        &self,
        path: &Path,
        options: &ExportOptions,
        actor: &Actor,
    ) -> Result<usize> {
        let file = std::fs::File::create(path)
            .map_err(|e| Error::operation("create_export_file", e))?;
        let writer = std::io::BufWriter::new(file);
        self.export_to_writer(writer, options, actor, None)
    }

    /// Exports records to a writer, returning the number written.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor may not export, a field path is
    /// invalid, the store query fails or writing fails.
    #[instrument(
        skip(self, writer, options, actor, progress),
        fields(entity_kind = %options.entity_kind, user.id = %actor.id)
    )]
    pub fn export_to_writer<W: Write>(
        &self,
        writer: W,
        options: &ExportOptions,
        actor: &Actor,
        progress: Option<ExportProgressCallback>,
    ) -> Result<usize> {
        let start = Instant::now();
        self.access.require(actor, Permission::Export, "export")?;

        let paths = options.field_paths()?;
        let unloaded = options.unloaded_relation_paths(&paths);
        if !unloaded.is_empty() {
            let columns: Vec<String> = unloaded.iter().map(ToString::to_string).collect();
            tracing::warn!(
                columns = %columns.join(","),
                "Relation columns requested without loading relations; they will be empty"
            );
        }
        let mut records = self.records.query(
            options.entity_kind,
            &options.filter,
            options.include_relations,
        )?;
        if let Some(limit) = options.limit {
            records.truncate(limit);
        }
        let total = records.len();

        let headers: Vec<String> = paths
            .iter()
            .map(|path| options.header_format.render(path))
            .collect();
        let mut sink = CsvExportSink::new(writer, &headers)?;
        for record in &records {
            sink.write_row(paths.iter().map(|path| path.resolve(record)))?;
            if let Some(ref cb) = progress {
                cb(sink.rows_written(), total);
            }
        }
        let exported = sink.rows_written();
        sink.finish()?;

        metrics::counter!("export_records_total", "entity_kind" => options.entity_kind.as_str())
            .increment(exported as u64);
        metrics::histogram!("export_duration_ms", "entity_kind" => options.entity_kind.as_str())
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::info!(
            exported,
            columns = paths.len(),
            duration_ms = start.elapsed().as_millis(),
            "Export finished"
        );
        Ok(exported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldMap, FieldValue};
    use crate::security::Role;
    use crate::storage::InMemoryRecordStore;

    fn org(name: &str, industry: Option<&str>) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), FieldValue::from(name));
        if let Some(industry) = industry {
            fields.insert("industry".to_string(), FieldValue::from(industry));
        }
        fields
    }

    fn service_with_orgs() -> ExportService {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .insert_with_id(EntityKind::Organization, "o1", org("Acme", Some("Manufacturing")))
            .unwrap();
        store
            .insert_with_id(EntityKind::Organization, "o2", org("Globex, Inc", None))
            .unwrap();
        ExportService::new(store)
    }

    #[test]
    fn test_readable_headers_and_quoting() {
        let service = service_with_orgs();
        let options = ExportOptions::new(EntityKind::Organization)
            .with_fields(["name", "industry"])
            .with_header_format(HeaderFormat::Readable);
        let result = service
            .export(&options, &Actor::new("u1", Role::Viewer))
            .unwrap();

        assert_eq!(result.exported, 2);
        assert_eq!(
            result.csv,
            "Name,Industry\nAcme,Manufacturing\n\"Globex, Inc\",\n"
        );
        assert!(result.file_name.starts_with("organizations_export_"));
    }

    #[test]
    fn test_default_fields() {
        let service = service_with_orgs();
        let result = service
            .export(
                &ExportOptions::new(EntityKind::Organization),
                &Actor::new("u1", Role::Member),
            )
            .unwrap();
        let header = result.csv.lines().next().unwrap();
        assert_eq!(
            header,
            "name,domain,industry,size,website,phone,tags,created_at"
        );
    }

    #[test]
    fn test_filter_and_limit() {
        let service = service_with_orgs();
        let actor = Actor::new("u1", Role::Member);
        let options = ExportOptions::new(EntityKind::Organization)
            .with_fields(["name"])
            .with_query("industry:manufacturing")
            .unwrap();
        assert_eq!(service.export(&options, &actor).unwrap().csv, "name\nAcme\n");

        let options = ExportOptions::new(EntityKind::Organization)
            .with_fields(["name"])
            .with_limit(1);
        assert_eq!(service.export(&options, &actor).unwrap().exported, 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let service = service_with_orgs();
        let options = ExportOptions::new(EntityKind::Organization).with_fields(["revenue"]);
        let err = service
            .export(&options, &Actor::new("u1", Role::Member))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_unloaded_relation_paths() {
        let options = ExportOptions::new(EntityKind::Contact)
            .with_fields(["first_name", "company.name", "company.domain"]);
        let paths = options.field_paths().unwrap();

        let unloaded: Vec<String> = options
            .unloaded_relation_paths(&paths)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(unloaded, vec!["company.name", "company.domain"]);

        let loaded = options.with_relations(true);
        assert!(loaded.unloaded_relation_paths(&paths).is_empty());
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(file_name(EntityKind::Deal, date), "deals_export_2024-03-09.csv");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orgs.csv");
        let service = service_with_orgs();
        let written = service
            .export_to_file(
                &path,
                &ExportOptions::new(EntityKind::Organization).with_fields(["name"]),
                &Actor::new("u1", Role::Member),
            )
            .unwrap();
        assert_eq!(written, 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("name\nAcme\n"));
    }
}
