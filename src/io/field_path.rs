//! Export field paths and header labels.

use crate::models::{EntityKind, Record};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How export header cells are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderFormat {
    /// The raw field path (`company.name`).
    #[default]
    SnakeCase,
    /// A title-cased label (`Company Name`).
    Readable,
}

impl HeaderFormat {
    /// Renders the header cell for a path.
    #[must_use]
    pub fn render(self, path: &FieldPath) -> String {
        match self {
            Self::SnakeCase => path.to_string(),
            Self::Readable => readable_label(&path.to_string()),
        }
    }
}

impl FromStr for HeaderFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "snake_case" | "snake" | "raw" => Ok(Self::SnakeCase),
            "readable" | "human" | "title" => Ok(Self::Readable),
            other => Err(Error::InvalidInput(format!("unknown header format: {other}"))),
        }
    }
}

/// Splits on `.` and `_`, title-cases each word and joins with spaces.
#[must_use]
pub fn readable_label(path: &str) -> String {
    path.split(['.', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A reference to a record field, optionally through one relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    /// Relation name for dotted paths.
    pub relation: Option<String>,
    /// Field name on the record or the related record.
    pub field: String,
}

impl FieldPath {
    /// Parses `field` or `relation.field`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty segments or more than one dot.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        let invalid = || Error::InvalidInput(format!("invalid field path: '{path}'"));
        let mut parts = path.split('.');
        let first = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        match (parts.next(), parts.next()) {
            (None, _) => Ok(Self {
                relation: None,
                field: first.to_string(),
            }),
            (Some(field), None) if !field.is_empty() => Ok(Self {
                relation: Some(first.to_string()),
                field: field.to_string(),
            }),
            _ => Err(invalid()),
        }
    }

    /// Returns true if the path goes through a relation.
    #[must_use]
    pub const fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    /// Checks the path against the schema of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the field or relation is unknown.
    pub fn check(&self, kind: EntityKind) -> Result<()> {
        let schema = kind.schema();
        let target = match &self.relation {
            Some(name) => schema
                .relation(name)
                .ok_or_else(|| {
                    Error::InvalidInput(format!("{kind} has no relation '{name}'"))
                })?
                .target
                .schema(),
            None => schema,
        };
        if target.field(&self.field).is_none() {
            return Err(Error::InvalidInput(format!(
                "unknown field '{}' in export path '{self}'",
                self.field
            )));
        }
        Ok(())
    }

    /// Renders the value at this path, or an empty cell if absent.
    #[must_use]
    pub fn resolve(&self, record: &Record) -> String {
        let fields = match &self.relation {
            Some(name) => match record.relations.get(name) {
                Some(fields) => fields,
                None => return String::new(),
            },
            None => &record.fields,
        };
        fields
            .get(&self.field)
            .map(crate::models::FieldValue::render)
            .unwrap_or_default()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{relation}.{}", self.field),
            None => f.write_str(&self.field),
        }
    }
}
