//! Duplicate detection for imports.
//!
//! Existing records are looked up once per run with a single batched
//! [`RecordStore::find_by_key`] call; rows are then resolved against the
//! resulting map. Records created during the run are added to the map so
//! later rows with the same key see them.

use crate::models::{EntityKind, RecordId};
use crate::storage::RecordStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// What to do with a row whose duplicate key matches a stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    /// Leave the stored record alone and count the row as skipped.
    #[default]
    Skip,
    /// Merge the row's mapped fields into the stored record.
    Update,
    /// Always create a new record, even if one matches.
    CreateNew,
}

impl DuplicateStrategy {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Update => "update",
            Self::CreateNew => "create_new",
        }
    }
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "skip" => Ok(Self::Skip),
            "update" => Ok(Self::Update),
            "create_new" | "create" => Ok(Self::CreateNew),
            other => Err(Error::InvalidInput(format!(
                "unknown duplicate strategy: {other}"
            ))),
        }
    }
}

/// Decision for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Drop the row; it matches this record.
    Skip(RecordId),
    /// Update this record.
    UpdateRecord(RecordId),
    /// Create a new record.
    CreateRecord,
}

/// Per-run duplicate resolver.
#[derive(Debug, Clone)]
pub struct DuplicateResolver {
    key_field: &'static str,
    strategy: DuplicateStrategy,
    existing: HashMap<String, RecordId>,
}

impl DuplicateResolver {
    /// Looks up stored records whose key is among `key_values`.
    ///
    /// An empty set is answered without touching the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the lookup fails.
    pub fn find_existing(
        store: &dyn RecordStore,
        kind: EntityKind,
        key_values: &BTreeSet<String>,
    ) -> Result<HashMap<String, RecordId>> {
        if key_values.is_empty() {
            return Ok(HashMap::new());
        }
        let found = store.find_by_key(kind, kind.duplicate_key(), key_values)?;
        tracing::debug!(
            entity_kind = %kind,
            key_field = kind.duplicate_key(),
            candidates = key_values.len(),
            matches = found.len(),
            "Duplicate key lookup"
        );
        Ok(found)
    }

    /// Builds a resolver for one run.
    ///
    /// `create_new` never consults the store.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the lookup fails.
    pub fn prepare(
        store: &dyn RecordStore,
        kind: EntityKind,
        strategy: DuplicateStrategy,
        key_values: &BTreeSet<String>,
    ) -> Result<Self> {
        let existing = match strategy {
            DuplicateStrategy::CreateNew => HashMap::new(),
            DuplicateStrategy::Skip | DuplicateStrategy::Update => {
                Self::find_existing(store, kind, key_values)?
            },
        };
        Ok(Self {
            key_field: kind.duplicate_key(),
            strategy,
            existing,
        })
    }

    /// Applies a strategy to an optional match.
    #[must_use]
    pub fn resolve(strategy: DuplicateStrategy, existing: Option<&RecordId>) -> Resolution {
        match (strategy, existing) {
            (DuplicateStrategy::Skip, Some(id)) => Resolution::Skip(id.clone()),
            (DuplicateStrategy::Update, Some(id)) => Resolution::UpdateRecord(id.clone()),
            (DuplicateStrategy::CreateNew, _) | (_, None) => Resolution::CreateRecord,
        }
    }

    /// Resolves a row by its key value (`None` when the row has no key).
    #[must_use]
    pub fn resolve_key(&self, key: Option<&str>) -> Resolution {
        Self::resolve(self.strategy, key.and_then(|k| self.existing.get(k)))
    }

    /// Records a key created during the run.
    ///
    /// The first record created for a key keeps it.
    pub fn remember(&mut self, key: &str, id: RecordId) {
        if self.strategy != DuplicateStrategy::CreateNew {
            self.existing.entry(key.to_string()).or_insert(id);
        }
    }

    /// Field used as the duplicate key.
    #[must_use]
    pub const fn key_field(&self) -> &'static str {
        self.key_field
    }

    /// Number of keys currently known to exist.
    #[must_use]
    pub fn known_keys(&self) -> usize {
        self.existing.len()
    }
}
