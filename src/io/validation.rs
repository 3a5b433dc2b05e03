//! Row coercion and validation.
//!
//! Turns one CSV row into a typed [`FieldMap`] for the target kind and
//! reports what went wrong along the way.
//!
//! # Coercion rules
//!
//! | Field type | Rule |
//! |------------|------|
//! | text | copied verbatim; empty cells omitted |
//! | tags | split on `;`, trimmed, empties and repeats removed |
//! | integer / float | parsed after stripping `,` and currency symbols; `0` on failure (warning) |
//! | date | `YYYY-MM-DD`, RFC 3339 or `MM/DD/YYYY`; anything else is a row error |
//! | timestamp | RFC 3339 or a date (midnight UTC); anything else is a row error |

use super::mapping::ColumnMapping;
use crate::models::{EntityKind, FieldMap, FieldSpec, FieldType, FieldValue, TAG_SEPARATOR};
use chrono::{DateTime, NaiveDate, Utc};

/// Severity of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Issue noted, the row is still written.
    Warning,
    /// The row is rejected.
    Error,
}

/// A validation issue found in one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The field that has an issue.
    pub field: String,
    /// Description of the issue.
    pub message: String,
    /// Severity of the issue.
    pub severity: ValidationSeverity,
}

impl ValidationIssue {
    /// Creates a warning issue.
    #[must_use]
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }

    /// Creates an error issue.
    #[must_use]
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Returns true for error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

/// Coerced fields of one row plus the issues found.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Typed values of the mapped, non-empty cells.
    pub fields: FieldMap,
    /// Issues found during coercion and checks.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns true if no issue has error severity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(ValidationIssue::is_error)
    }

    /// Joins the error messages of this row, or `None` if it is valid.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .issues
            .iter()
            .filter(|i| i.is_error())
            .map(|i| i.message.as_str())
            .collect();
        (!messages.is_empty()).then(|| messages.join("; "))
    }

    /// Number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| !i.is_error()).count()
    }
}

/// Coerces rows of one table according to a finalized mapping.
///
/// Column positions and field specs are resolved once, up front.
#[derive(Debug, Clone)]
pub struct RowValidator {
    kind: EntityKind,
    columns: Vec<(usize, &'static FieldSpec)>,
}

impl RowValidator {
    /// Resolves the mapping against the table headers.
    ///
    /// Entries that are unmapped, point at unknown fields or name a header
    /// the table lacks are ignored. [`ColumnMapper::validate`] and
    /// [`ColumnMapper::validate_columns`] reject such mappings before any
    /// row is coerced.
    ///
    /// [`ColumnMapper::validate`]: crate::io::ColumnMapper::validate
    /// [`ColumnMapper::validate_columns`]: crate::io::ColumnMapper::validate_columns
    #[must_use]
    pub fn new(kind: EntityKind, headers: &[String], mapping: &[ColumnMapping]) -> Self {
        let schema = kind.schema();
        let columns = mapping
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_mapped())
            .filter_map(|(position, entry)| {
                let index = if headers.get(position) == Some(&entry.source_header) {
                    position
                } else {
                    headers.iter().position(|h| *h == entry.source_header)?
                };
                schema.field(&entry.target_field).map(|field_spec| (index, field_spec))
            })
            .collect();
        Self { kind, columns }
    }

    /// Returns true if `field` is fed by some column.
    #[must_use]
    pub fn maps_field(&self, field: &str) -> bool {
        self.columns.iter().any(|(_, field_spec)| field_spec.name == field)
    }

    /// Coerces one row and checks required fields.
    #[must_use]
    pub fn validate(&self, row: &[String]) -> ValidationResult {
        let mut result = ValidationResult::default();

        for (index, field_spec) in &self.columns {
            let raw = row.get(*index).map_or("", |cell| cell.trim());
            if raw.is_empty() {
                continue;
            }
            match coerce(field_spec, raw) {
                Ok((value, warning)) => {
                    if let Some(warning) = warning {
                        result.issues.push(warning);
                    }
                    if let Some(value) = value {
                        result.fields.insert(field_spec.name.to_string(), value);
                    }
                },
                Err(issue) => result.issues.push(issue),
            }
        }

        result.issues.extend(check_required(self.kind, &result.fields));
        result
    }
}

/// Reports required fields of `kind` absent from `fields`.
#[must_use]
pub fn check_required(kind: EntityKind, fields: &FieldMap) -> Vec<ValidationIssue> {
    kind.schema()
        .required_fields()
        .into_iter()
        .filter(|field| fields.get(*field).is_none_or(is_blank))
        .map(|field| ValidationIssue::error(field, format!("missing required field: {field}")))
        .collect()
}

fn is_blank(value: &FieldValue) -> bool {
    value.as_text().is_some_and(|s| s.trim().is_empty())
}

type Coerced = (Option<FieldValue>, Option<ValidationIssue>);

fn coerce(field_spec: &FieldSpec, raw: &str) -> Result<Coerced, ValidationIssue> {
    let value = match field_spec.field_type {
        FieldType::Text => FieldValue::Text(raw.to_string()),
        FieldType::Tags => {
            let tags = FieldValue::tags(raw.split(TAG_SEPARATOR));
            if tags.as_tags().is_some_and(<[String]>::is_empty) {
                return Ok((None, None));
            }
            tags
        },
        FieldType::Integer => {
            return Ok(match parse_integer(raw) {
                Some(i) => (Some(FieldValue::Integer(i)), None),
                None => (
                    Some(FieldValue::Integer(0)),
                    Some(not_a_number(field_spec.name, raw)),
                ),
            });
        },
        FieldType::Float => {
            return Ok(match parse_float(raw) {
                Some(f) => (Some(FieldValue::Float(f)), None),
                None => (
                    Some(FieldValue::Float(0.0)),
                    Some(not_a_number(field_spec.name, raw)),
                ),
            });
        },
        FieldType::Date => FieldValue::Date(parse_date(raw).ok_or_else(|| {
            ValidationIssue::error(field_spec.name, format!("invalid date for {}: '{raw}'", field_spec.name))
        })?),
        FieldType::Timestamp => FieldValue::Timestamp(parse_timestamp(raw).ok_or_else(|| {
            ValidationIssue::error(
                field_spec.name,
                format!("invalid timestamp for {}: '{raw}'", field_spec.name),
            )
        })?),
    };
    Ok((Some(value), None))
}

fn not_a_number(field: &str, raw: &str) -> ValidationIssue {
    ValidationIssue::warning(field, format!("'{raw}' is not a number, using 0"))
}

fn clean_number(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '%' | ' '))
        .collect()
}

/// Parses an integer cell, accepting a whole-valued decimal like `85.0`.
#[must_use]
pub fn parse_integer(raw: &str) -> Option<i64> {
    let cleaned = clean_number(raw);
    cleaned.parse::<i64>().ok().or_else(|| {
        let f = cleaned.parse::<f64>().ok()?;
        #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
        let whole = (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64);
        whole
    })
}

/// Parses a decimal cell.
#[must_use]
pub fn parse_float(raw: &str) -> Option<f64> {
    clean_number(raw)
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
}

/// Parses `YYYY-MM-DD`, RFC 3339 or `MM/DD/YYYY`.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())
}

/// Parses an RFC 3339 timestamp or a date (midnight UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            parse_date(raw)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::mapping::mapping_from_pairs;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_contact_row() {
        let headers = headers(&["First", "Last", "Tags", "Score"]);
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("First", "first_name"), ("Last", "last_name"), ("Tags", "tags"), ("Score", "lead_score")],
        );
        let validator = RowValidator::new(EntityKind::Contact, &headers, &mapping);

        let result = validator.validate(&row(&["Jane", "Doe", "vip; lead ;;vip", "42"]));
        assert!(result.is_valid());
        assert_eq!(result.fields["first_name"], FieldValue::from("Jane"));
        assert_eq!(result.fields["tags"], FieldValue::tags(["vip", "lead"]));
        assert_eq!(result.fields["lead_score"], FieldValue::Integer(42));
    }

    #[test]
    fn test_missing_required_field() {
        let headers = headers(&["First Name", "Last Name", "Email"]);
        let mapping = mapping_from_pairs(
            EntityKind::Contact,
            &[("First Name", "first_name"), ("Last Name", "last_name"), ("Email", "email")],
        );
        let validator = RowValidator::new(EntityKind::Contact, &headers, &mapping);

        let result = validator.validate(&row(&["", "Smith", "bad"]));
        assert!(!result.is_valid());
        assert_eq!(
            result.error_message().as_deref(),
            Some("missing required field: first_name")
        );
        assert!(!result.fields.contains_key("first_name"));
    }

    #[test]
    fn test_numeric_fallback_is_warning() {
        let headers = headers(&["Title", "Value", "Probability"]);
        let mapping = mapping_from_pairs(
            EntityKind::Deal,
            &[("Title", "title"), ("Value", "value"), ("Probability", "probability")],
        );
        let validator = RowValidator::new(EntityKind::Deal, &headers, &mapping);

        let result = validator.validate(&row(&["Big deal", "lots", "high"]));
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 2);
        assert_eq!(result.fields["value"], FieldValue::Float(0.0));
        assert_eq!(result.fields["probability"], FieldValue::Integer(0));
    }

    #[test]
    fn test_invalid_date_is_row_error() {
        let headers = headers(&["Title", "Close"]);
        let mapping = mapping_from_pairs(
            EntityKind::Deal,
            &[("Title", "title"), ("Close", "expected_close_date")],
        );
        let validator = RowValidator::new(EntityKind::Deal, &headers, &mapping);

        let result = validator.validate(&row(&["Deal", "next tuesday"]));
        assert!(!result.is_valid());
        assert!(result.error_message().unwrap().contains("expected_close_date"));
    }

    #[test]
    fn test_mapping_order_independent_of_headers() {
        let headers = headers(&["Name", "Domain"]);
        let mapping = mapping_from_pairs(
            EntityKind::Organization,
            &[("Domain", "domain"), ("Name", "name")],
        );
        let validator = RowValidator::new(EntityKind::Organization, &headers, &mapping);
        let result = validator.validate(&row(&["Acme", "acme.com"]));
        assert_eq!(result.fields["name"], FieldValue::from("Acme"));
        assert_eq!(result.fields["domain"], FieldValue::from("acme.com"));
        assert!(validator.maps_field("domain"));
        assert!(!validator.maps_field("owner_id"));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_integer("1,200"), Some(1200));
        assert_eq!(parse_integer("85.0"), Some(85));
        assert_eq!(parse_integer("85.5"), None);
        assert_eq!(parse_float("$1,500.25"), Some(1500.25));
        assert_eq!(parse_float("abc"), None);
        assert_eq!(parse_float("NaN"), None);
    }

    #[test]
    fn test_parse_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_date("2024-03-09"), expected);
        assert_eq!(parse_date("03/09/2024"), expected);
        assert_eq!(parse_date("2024-03-09T10:00:00Z"), expected);
        assert_eq!(parse_date("09.03.2024"), None);

        let ts = parse_timestamp("2024-03-09").unwrap();
        assert_eq!(ts.date_naive(), expected.unwrap());
    }
}
