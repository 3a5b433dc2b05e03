//! Column mapping inference and validation.
//!
//! Headers are matched against the target kind's schema in two passes:
//!
//! 1. An exact match of the normalized header (lowercase, spaces and
//!    hyphens replaced by `_`) against an importable field name.
//! 2. An ordered list of case-insensitive pattern rules for the kind. The
//!    first rule whose field is still unclaimed wins.
//!
//! Each field is assigned to at most one column by inference. Operators
//! may edit the result freely; [`ColumnMapper::validate`] checks the final
//! mapping before any row is processed.

use super::formats::CsvTable;
use crate::models::EntityKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error as ThisError;

/// Number of data rows carried by a preview unless configured otherwise.
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Reasons a mapping cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum MappingError {
    /// Required fields of the kind are not mapped from any column.
    #[error("missing required field mapping: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    /// Two or more columns claim the same field.
    #[error("field '{field}' is mapped from more than one column: {}", .columns.join(", "))]
    DuplicateTarget {
        /// The contested field.
        field: String,
        /// Source headers claiming it.
        columns: Vec<String>,
    },

    /// A column targets a field the kind does not have.
    #[error("column '{column}' targets unknown {kind} field '{field}'")]
    UnknownField {
        /// Target entity kind.
        kind: EntityKind,
        /// The unknown field.
        field: String,
        /// Source header.
        column: String,
    },

    /// A mapped column is not present in the uploaded file.
    #[error("mapped column '{column}' is not in the file")]
    UnknownColumn {
        /// Source header named by the mapping.
        column: String,
    },

    /// A column targets a system-maintained field.
    #[error("column '{column}' targets read-only field '{field}'")]
    ReadOnlyField {
        /// The read-only field.
        field: String,
        /// Source header.
        column: String,
    },
}

/// How one source column feeds the target record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Header text in the uploaded file.
    pub source_header: String,
    /// Target field name; empty means the column is not imported.
    pub target_field: String,
    /// Whether the target is a required field of the kind.
    pub required: bool,
    /// First non-empty value of the column.
    pub sample: String,
}

impl ColumnMapping {
    /// Creates a mapping entry.
    #[must_use]
    pub fn new(source_header: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source_header: source_header.into(),
            target_field: target_field.into(),
            required: false,
            sample: String::new(),
        }
    }

    /// Returns true if the column is imported.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        !self.target_field.is_empty()
    }

    /// Points the column at another field (empty to ignore it).
    pub fn retarget(&mut self, target_field: impl Into<String>, kind: EntityKind) {
        self.target_field = target_field.into();
        self.required = kind.schema().is_required(&self.target_field);
    }
}

/// Builds a mapping list from `(source header, target field)` pairs.
#[must_use]
pub fn mapping_from_pairs(kind: EntityKind, pairs: &[(&str, &str)]) -> Vec<ColumnMapping> {
    pairs
        .iter()
        .map(|(source, target)| {
            let mut entry = ColumnMapping::new(*source, "");
            entry.retarget(*target, kind);
            entry
        })
        .collect()
}

/// Flattens a mapping list into `source header -> target field`.
#[must_use]
pub fn mapping_summary(mapping: &[ColumnMapping]) -> BTreeMap<String, String> {
    mapping
        .iter()
        .map(|m| (m.source_header.clone(), m.target_field.clone()))
        .collect()
}

/// Read-only view of an upload shown before an import runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPreview {
    /// Column headers.
    pub headers: Vec<String>,
    /// The first few data rows.
    pub rows: Vec<Vec<String>>,
    /// Number of data rows in the whole file.
    pub total_rows: usize,
    /// Inferred mapping, one entry per column.
    pub mapping: Vec<ColumnMapping>,
    /// Rows whose duplicate key matches a stored record.
    pub duplicate_count: usize,
}

type Rules = Vec<(Regex, &'static str)>;

fn compile(rules: &[(&str, &'static str)]) -> Rules {
    rules
        .iter()
        .filter_map(|(pattern, field)| {
            Regex::new(&format!("(?i){pattern}"))
                .ok()
                .map(|re| (re, *field))
        })
        .collect()
}

static CONTACT_RULES: Lazy<Rules> = Lazy::new(|| {
    compile(&[
        (r"first.*name|given.*name|^fname$|^first$", "first_name"),
        (r"last.*name|sur.?name|family.*name|^lname$|^last$", "last_name"),
        (r"e-?mail", "email"),
        (r"phone|mobile|cell|\btel\b", "phone"),
        (r"title|position|\bjob\b|\brole\b", "title"),
        (r"status|lifecycle", "status"),
        (r"score|rating", "lead_score"),
        (r"^tags?$|labels?|keywords?", "tags"),
        (r"notes?|comments?|description", "notes"),
        (r"(company|organi[sz]ation|account).*id", "company_id"),
        (r"owner|assigned", "owner_id"),
    ])
});

static ORGANIZATION_RULES: Lazy<Rules> = Lazy::new(|| {
    compile(&[
        (
            r"(company|organi[sz]ation|account|business).*name|^name$|^company$|^organi[sz]ation$",
            "name",
        ),
        (r"domain", "domain"),
        (r"website|\burl\b|\bweb\b", "website"),
        (r"industry|sector|vertical", "industry"),
        (r"size|employees|headcount", "size"),
        (r"phone|\btel\b", "phone"),
        (r"address|street|city|location", "address"),
        (r"status", "status"),
        (r"^tags?$|labels?|keywords?", "tags"),
        (r"notes?|comments?|description", "notes"),
        (r"owner|assigned", "owner_id"),
    ])
});

static DEAL_RULES: Lazy<Rules> = Lazy::new(|| {
    compile(&[
        (r"title|deal.*name|opportunity|^name$|subject", "title"),
        (r"value|amount|price|revenue|worth", "value"),
        (r"currency", "currency"),
        (r"stage|pipeline", "stage_id"),
        (r"probability|likelihood|chance|confidence", "probability"),
        (r"close.*date|expected.*close|closing", "expected_close_date"),
        (r"status", "status"),
        (r"^tags?$|labels?|keywords?", "tags"),
        (r"notes?|comments?|description", "notes"),
        (r"(contact|person).*id", "contact_id"),
        (r"(company|organi[sz]ation|account).*id", "company_id"),
        (r"owner|assigned", "owner_id"),
    ])
});

fn rules_for(kind: EntityKind) -> &'static Rules {
    match kind {
        EntityKind::Contact => &CONTACT_RULES,
        EntityKind::Organization => &ORGANIZATION_RULES,
        EntityKind::Deal => &DEAL_RULES,
    }
}

/// Normalizes a header for exact field matching.
#[must_use]
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Infers and validates column mappings.
#[derive(Debug, Clone, Copy)]
pub struct ColumnMapper {
    preview_rows: usize,
}

impl Default for ColumnMapper {
    fn default() -> Self {
        Self {
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl ColumnMapper {
    /// Creates a mapper with the default preview size.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many data rows a preview carries.
    #[must_use]
    pub const fn with_preview_rows(mut self, preview_rows: usize) -> Self {
        self.preview_rows = preview_rows;
        self
    }

    /// Guesses a target field for one header.
    ///
    /// Fields in `claimed` are never returned.
    #[must_use]
    pub fn infer_field(
        header: &str,
        kind: EntityKind,
        claimed: &HashSet<&str>,
    ) -> Option<&'static str> {
        let schema = kind.schema();
        let normalized = normalize_header(header);
        if let Some(field_spec) = schema.field(&normalized)
            && field_spec.importable
            && !claimed.contains(field_spec.name)
        {
            return Some(field_spec.name);
        }

        let header = header.trim();
        rules_for(kind)
            .iter()
            .find(|(re, field)| !claimed.contains(field) && re.is_match(header))
            .map(|(_, field)| *field)
    }

    /// Builds a preview with a best-guess mapping for every column.
    #[must_use]
    pub fn infer_mapping(&self, table: &CsvTable, kind: EntityKind) -> ImportPreview {
        let schema = kind.schema();
        let mut claimed: HashSet<&str> = HashSet::new();
        let mut mapping = Vec::with_capacity(table.headers().len());

        for (index, header) in table.headers().iter().enumerate() {
            let target = Self::infer_field(header, kind, &claimed);
            if let Some(field) = target {
                claimed.insert(field);
            }
            let target_field = target.unwrap_or_default().to_string();
            mapping.push(ColumnMapping {
                source_header: header.clone(),
                required: schema.is_required(&target_field),
                target_field,
                sample: table
                    .column(index)
                    .find(|cell| !cell.is_empty())
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        tracing::debug!(
            entity_kind = %kind,
            columns = mapping.len(),
            mapped = claimed.len(),
            "Inferred column mapping"
        );

        ImportPreview {
            headers: table.headers().to_vec(),
            rows: table.rows().iter().take(self.preview_rows).cloned().collect(),
            total_rows: table.row_count(),
            mapping,
            duplicate_count: 0,
        }
    }

    /// Checks that a mapping can be executed for `kind`.
    ///
    /// Unknown and read-only targets are reported first, then fields
    /// claimed by several columns, then unmapped required fields.
    ///
    /// # Errors
    ///
    /// Returns the first [`MappingError`] found.
    pub fn validate(mapping: &[ColumnMapping], kind: EntityKind) -> Result<(), MappingError> {
        let schema = kind.schema();
        let mut claims: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for entry in mapping.iter().filter(|m| m.is_mapped()) {
            let Some(field_spec) = schema.field(&entry.target_field) else {
                return Err(MappingError::UnknownField {
                    kind,
                    field: entry.target_field.clone(),
                    column: entry.source_header.clone(),
                });
            };
            if !field_spec.importable {
                return Err(MappingError::ReadOnlyField {
                    field: entry.target_field.clone(),
                    column: entry.source_header.clone(),
                });
            }
            claims
                .entry(field_spec.name)
                .or_default()
                .push(entry.source_header.clone());
        }

        if let Some((field, columns)) = claims.iter().find(|(_, columns)| columns.len() > 1) {
            return Err(MappingError::DuplicateTarget {
                field: (*field).to_string(),
                columns: columns.clone(),
            });
        }

        let missing: Vec<String> = schema
            .required_fields()
            .into_iter()
            .filter(|field| !claims.contains_key(field))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            return Err(MappingError::MissingRequiredFields(missing));
        }

        Ok(())
    }

    /// Checks that every mapped entry names a header of the table.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::UnknownColumn`] for the first mapped entry
    /// whose source header is missing.
    pub fn validate_columns(
        mapping: &[ColumnMapping],
        headers: &[String],
    ) -> Result<(), MappingError> {
        match mapping
            .iter()
            .filter(|m| m.is_mapped())
            .find(|m| !headers.contains(&m.source_header))
        {
            Some(entry) => Err(MappingError::UnknownColumn {
                column: entry.source_header.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn table(raw: &str) -> CsvTable {
        CsvTable::parse(raw).unwrap()
    }

    #[test_case(EntityKind::Contact, "First Name", Some("first_name"); "contact first name")]
    #[test_case(EntityKind::Contact, "Surname", Some("last_name"); "contact surname")]
    #[test_case(EntityKind::Contact, "E-mail Address", Some("email"); "contact email")]
    #[test_case(EntityKind::Contact, "Mobile", Some("phone"); "contact mobile")]
    #[test_case(EntityKind::Contact, "Job Title", Some("title"); "contact job title")]
    #[test_case(EntityKind::Contact, "Lead Score", Some("lead_score"); "contact lead score")]
    #[test_case(EntityKind::Contact, "Labels", Some("tags"); "contact labels")]
    #[test_case(EntityKind::Contact, "lead_score", Some("lead_score"); "contact exact")]
    #[test_case(EntityKind::Contact, "Favourite Colour", None; "contact unknown")]
    #[test_case(EntityKind::Contact, "created_at", None; "contact system field")]
    #[test_case(EntityKind::Organization, "Company Name", Some("name"); "org company name")]
    #[test_case(EntityKind::Organization, "Website", Some("website"); "org website")]
    #[test_case(EntityKind::Organization, "Employees", Some("size"); "org employees")]
    #[test_case(EntityKind::Organization, "Sector", Some("industry"); "org sector")]
    #[test_case(EntityKind::Deal, "Deal Name", Some("title"); "deal name")]
    #[test_case(EntityKind::Deal, "Amount", Some("value"); "deal amount")]
    #[test_case(EntityKind::Deal, "Pipeline Stage", Some("stage_id"); "deal stage")]
    #[test_case(EntityKind::Deal, "Expected Close Date", Some("expected_close_date"); "deal close")]
    #[test_case(EntityKind::Deal, "Win Probability", Some("probability"); "deal probability")]
    fn test_infer_field(kind: EntityKind, header: &str, expected: Option<&str>) {
        assert_eq!(
            ColumnMapper::infer_field(header, kind, &HashSet::new()),
            expected
        );
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  First Name "), "first_name");
        assert_eq!(normalize_header("expected-close  date"), "expected_close_date");
        assert_eq!(normalize_header("LEAD__SCORE"), "lead_score");
    }

    #[test]
    fn test_infer_mapping_scenario() {
        let table = table("First Name,Last Name,Email\nJane,Doe,jane@x.com\n,Smith,bad\n");
        let preview = ColumnMapper::new().infer_mapping(&table, EntityKind::Contact);

        let targets: Vec<&str> = preview
            .mapping
            .iter()
            .map(|m| m.target_field.as_str())
            .collect();
        assert_eq!(targets, vec!["first_name", "last_name", "email"]);
        assert!(preview.mapping[0].required);
        assert!(!preview.mapping[2].required);
        assert_eq!(preview.mapping[0].sample, "Jane");
        assert_eq!(preview.total_rows, 2);
        assert_eq!(preview.duplicate_count, 0);
        assert!(ColumnMapper::validate(&preview.mapping, EntityKind::Contact).is_ok());
    }

    #[test]
    fn test_infer_mapping_does_not_reassign_claimed_field() {
        let table = table("Work Phone,Mobile Phone,First Name,Last Name\n1,2,A,B\n");
        let preview = ColumnMapper::new().infer_mapping(&table, EntityKind::Contact);
        assert_eq!(preview.mapping[0].target_field, "phone");
        assert_eq!(preview.mapping[1].target_field, "");
    }

    #[test]
    fn test_sample_skips_empty_cells() {
        let table = table("name,industry\nAcme,\nGlobex,Retail\n");
        let preview = ColumnMapper::new().infer_mapping(&table, EntityKind::Organization);
        assert_eq!(preview.mapping[1].sample, "Retail");
    }

    #[test]
    fn test_preview_is_bounded() {
        let mut raw = String::from("name\n");
        for i in 0..20 {
            raw.push_str(&format!("Org {i}\n"));
        }
        let table = table(&raw);

        let preview = ColumnMapper::new().infer_mapping(&table, EntityKind::Organization);
        assert_eq!(preview.rows.len(), DEFAULT_PREVIEW_ROWS);
        assert_eq!(preview.total_rows, 20);

        let preview = ColumnMapper::new()
            .with_preview_rows(2)
            .infer_mapping(&table, EntityKind::Organization);
        assert_eq!(preview.rows.len(), 2);
    }

    #[test]
    fn test_validate_missing_required() {
        let mapping = mapping_from_pairs(EntityKind::Contact, &[("First", "first_name"), ("Mail", "email")]);
        assert_eq!(
            ColumnMapper::validate(&mapping, EntityKind::Contact),
            Err(MappingError::MissingRequiredFields(vec!["last_name".to_string()]))
        );
    }

    #[test]
    fn test_validate_duplicate_target() {
        let mapping = mapping_from_pairs(EntityKind::Organization, &[("A", "name"), ("B", "name")]);
        let err = ColumnMapper::validate(&mapping, EntityKind::Organization).unwrap_err();
        assert_eq!(
            err,
            MappingError::DuplicateTarget {
                field: "name".to_string(),
                columns: vec!["A".to_string(), "B".to_string()],
            }
        );
    }

    #[test]
    fn test_validate_unknown_and_read_only() {
        let mapping = mapping_from_pairs(EntityKind::Deal, &[("T", "title"), ("X", "colour")]);
        assert!(matches!(
            ColumnMapper::validate(&mapping, EntityKind::Deal),
            Err(MappingError::UnknownField { .. })
        ));

        let mapping = mapping_from_pairs(EntityKind::Deal, &[("T", "title"), ("C", "created_at")]);
        assert!(matches!(
            ColumnMapper::validate(&mapping, EntityKind::Deal),
            Err(MappingError::ReadOnlyField { .. })
        ));
    }

    #[test]
    fn test_validate_columns_against_headers() {
        let headers = table("First Name,Last Name\nJane,Doe").headers().to_vec();
        let typo = mapping_from_pairs(
            EntityKind::Contact,
            &[("Fname", "first_name"), ("Last Name", "last_name")],
        );
        assert_eq!(
            ColumnMapper::validate_columns(&typo, &headers),
            Err(MappingError::UnknownColumn {
                column: "Fname".to_string()
            })
        );

        let mut unmapped = mapping_from_pairs(
            EntityKind::Contact,
            &[("First Name", "first_name"), ("Last Name", "last_name")],
        );
        unmapped.push(ColumnMapping::new("Ghost", ""));
        assert!(ColumnMapper::validate_columns(&unmapped, &headers).is_ok());
    }

    #[test]
    fn test_validate_ignores_unmapped_columns() {
        let mapping = mapping_from_pairs(EntityKind::Deal, &[("T", "title"), ("Junk", ""), ("More", "")]);
        assert!(ColumnMapper::validate(&mapping, EntityKind::Deal).is_ok());
    }

    #[test]
    fn test_retarget_updates_required() {
        let mut entry = ColumnMapping::new("Name", "");
        entry.retarget("name", EntityKind::Organization);
        assert!(entry.required);
        entry.retarget("", EntityKind::Organization);
        assert!(!entry.required);
        assert!(!entry.is_mapped());
    }

    #[test]
    fn test_error_messages() {
        let err = MappingError::MissingRequiredFields(vec!["first_name".into(), "last_name".into()]);
        assert_eq!(
            err.to_string(),
            "missing required field mapping: first_name, last_name"
        );
    }
}
