//! Record filters.
//!
//! Filters can be built programmatically or parsed from a compact query
//! syntax:
//! - `status:lead` - field equals value (case-insensitive)
//! - `name~acme` - field contains substring (case-insensitive)
//! - `tag:vip` - record carries the tag
//! - `id:r1,r2` - restrict to record ids

use super::{Record, RecordId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single predicate over a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterCondition {
    /// Rendered field value equals `value`, ignoring case.
    Equals {
        /// Field name.
        field: String,
        /// Expected value.
        value: String,
    },
    /// Rendered field value contains `needle`, ignoring case.
    Contains {
        /// Field name.
        field: String,
        /// Substring to look for.
        needle: String,
    },
    /// Record's tag list contains `tag`, ignoring case.
    HasTag {
        /// Tag to look for.
        tag: String,
    },
}

impl FilterCondition {
    /// Returns true if the record satisfies this condition.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Equals { field, value } => record
                .fields
                .get(field)
                .is_some_and(|v| v.render().eq_ignore_ascii_case(value)),
            Self::Contains { field, needle } => record.fields.get(field).is_some_and(|v| {
                v.render()
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            }),
            Self::HasTag { tag } => record.tags().iter().any(|t| t.eq_ignore_ascii_case(tag)),
        }
    }
}

/// Selection criteria for queries and exports.
///
/// All conditions must hold (AND). An `ids` restriction, when present,
/// is applied in addition to the conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Restrict to these record ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<BTreeSet<RecordId>>,
    /// Conditions combined with AND.
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
}

impl RecordFilter {
    /// Creates an empty filter that matches every record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the filter to the given ids.
    #[must_use]
    pub fn with_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Adds an equality condition.
    #[must_use]
    pub fn with_equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(FilterCondition::Equals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a substring condition.
    #[must_use]
    pub fn with_contains(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.conditions.push(FilterCondition::Contains {
            field: field.into(),
            needle: needle.into(),
        });
        self
    }

    /// Adds a tag condition.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.conditions
            .push(FilterCondition::HasTag { tag: tag.into() });
        self
    }

    /// Returns true if the filter has no criteria.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_none() && self.conditions.is_empty()
    }

    /// Returns true if the record passes the filter.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ids) = &self.ids
            && !ids.contains(&record.id)
        {
            return false;
        }
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Parses a filter query such as `status:lead tag:vip name~acme id:r1,r2`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a token that is neither
    /// `field:value` nor `field~needle`, or that has an empty side.
    pub fn parse(query: &str) -> Result<Self> {
        let mut filter = Self::new();
        for token in query.split_whitespace() {
            parse_token(token, &mut filter)?;
        }
        Ok(filter)
    }
}

fn parse_token(token: &str, filter: &mut RecordFilter) -> Result<()> {
    let invalid = || Error::InvalidInput(format!("invalid filter token: {token}"));

    if let Some((field, needle)) = token.split_once('~') {
        if field.is_empty() || needle.is_empty() {
            return Err(invalid());
        }
        filter.conditions.push(FilterCondition::Contains {
            field: field.to_lowercase(),
            needle: needle.to_string(),
        });
        return Ok(());
    }

    let (key, value) = token.split_once(':').ok_or_else(invalid)?;
    if key.is_empty() || value.is_empty() {
        return Err(invalid());
    }

    match key.to_lowercase().as_str() {
        "tag" | "tags" => {
            for tag in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                filter.conditions.push(FilterCondition::HasTag {
                    tag: tag.to_string(),
                });
            }
        },
        "id" | "ids" => {
            let ids = filter.ids.get_or_insert_with(BTreeSet::new);
            ids.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(RecordId::from),
            );
        },
        field => filter.conditions.push(FilterCondition::Equals {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
    Ok(())
}
