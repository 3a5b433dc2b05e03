//! Typed field values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field name to value map carried by records and write requests.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Separator used when tags are flattened into a single CSV cell.
pub const TAG_SEPARATOR: char = ';';

/// The declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Free text.
    Text,
    /// Whole number.
    Integer,
    /// Decimal number.
    Float,
    /// Set-valued list of labels.
    Tags,
    /// Calendar date.
    Date,
    /// Point in time (UTC).
    Timestamp,
}

impl FieldType {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Tags => "tags",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }

    /// Returns true for integer and float fields.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text.
    Text(String),
    /// Whole number.
    Integer(i64),
    /// Decimal number.
    Float(f64),
    /// Ordered, de-duplicated labels.
    Tags(Vec<String>),
    /// Calendar date.
    Date(NaiveDate),
    /// Point in time.
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Returns the type of this value.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Text(_) => FieldType::Text,
            Self::Integer(_) => FieldType::Integer,
            Self::Float(_) => FieldType::Float,
            Self::Tags(_) => FieldType::Tags,
            Self::Date(_) => FieldType::Date,
            Self::Timestamp(_) => FieldType::Timestamp,
        }
    }

    /// Returns the text if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the tag list if this is a tags value.
    #[must_use]
    pub fn as_tags(&self) -> Option<&[String]> {
        match self {
            Self::Tags(tags) => Some(tags),
            _ => None,
        }
    }

    /// Renders the value as a CSV cell.
    ///
    /// Dates and timestamps render as `YYYY-MM-DD`, tags are joined with
    /// [`TAG_SEPARATOR`].
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Tags(tags) => tags.join(&TAG_SEPARATOR.to_string()),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Timestamp(ts) => ts.date_naive().format("%Y-%m-%d").to_string(),
        }
    }

    /// Builds a tags value, trimming entries and dropping empties and repeats.
    #[must_use]
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if !tag.is_empty() && !out.iter().any(|t| t == tag) {
                out.push(tag.to_string());
            }
        }
        Self::Tags(out)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}
