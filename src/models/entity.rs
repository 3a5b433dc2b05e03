//! Entity kinds, record identifiers and records.

use super::FieldMap;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The three record types the engine operates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// People.
    #[serde(rename = "contacts", alias = "contact")]
    Contact,
    /// Companies.
    #[serde(rename = "organizations", alias = "organization")]
    Organization,
    /// Sales opportunities.
    #[serde(rename = "deals", alias = "deal")]
    Deal,
}

impl EntityKind {
    /// Returns all entity kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Contact, Self::Organization, Self::Deal]
    }

    /// Returns the table name used in file names and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contact => "contacts",
            Self::Organization => "organizations",
            Self::Deal => "deals",
        }
    }

    /// Returns a human label for the kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Contact => "Contact",
            Self::Organization => "Organization",
            Self::Deal => "Deal",
        }
    }

    /// Parses a kind name. Accepts singular, plural and `company` aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "contact" | "contacts" | "person" | "people" => Some(Self::Contact),
            "organization" | "organizations" | "organisation" | "organisations" | "company"
            | "companies" => Some(Self::Organization),
            "deal" | "deals" | "opportunity" | "opportunities" => Some(Self::Deal),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown entity kind: {s}")))
    }
}

/// Unique identifier for a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a record ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A stored record with its own fields and, when requested, related records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier.
    pub id: RecordId,
    /// Entity kind.
    pub kind: EntityKind,
    /// The record's own fields.
    pub fields: FieldMap,
    /// Related records keyed by relation name (e.g. `company`).
    ///
    /// Only populated when the query asked for relations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<String, FieldMap>,
}

impl Record {
    /// Creates a record without relations.
    #[must_use]
    pub fn new(id: RecordId, kind: EntityKind, fields: FieldMap) -> Self {
        Self {
            id,
            kind,
            fields,
            relations: BTreeMap::new(),
        }
    }

    /// Returns the tag list of this record (empty if none).
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.fields
            .get("tags")
            .and_then(|v| v.as_tags())
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Returns a text field, if present.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!(EntityKind::parse("Contacts"), Some(EntityKind::Contact));
        assert_eq!(EntityKind::parse("company"), Some(EntityKind::Organization));
        assert_eq!(EntityKind::parse("deal"), Some(EntityKind::Deal));
        assert_eq!(EntityKind::parse("lead"), None);
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_kind_as_str_roundtrips() {
        for kind in EntityKind::all() {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(*kind));
        }
    }

    #[test]
    fn test_record_tags() {
        let mut fields = FieldMap::new();
        fields.insert("tags".to_string(), FieldValue::tags(["a", "b"]));
        let record = Record::new(RecordId::new("r1"), EntityKind::Contact, fields);
        assert_eq!(record.tags(), vec!["a", "b"]);

        let empty = Record::new(RecordId::new("r2"), EntityKind::Contact, FieldMap::new());
        assert!(empty.tags().is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RecordId::generate(), RecordId::generate());
    }
}
