//! Bulk actions over selected records.
//!
//! One request applies one action to an explicit set of record ids. Records
//! are processed in id order; there is no atomicity across the set.

use crate::io::{ExportOptions, ExportResult, ExportService, HeaderFormat};
use crate::models::{Actor, EntityKind, FieldMap, FieldValue, RecordFilter, RecordId, UserId};
use crate::security::{AccessControl, Permission};
use crate::storage::RecordStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// An action applied to every selected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    /// Sets `owner_id`.
    Assign {
        /// New owner.
        owner_id: UserId,
    },
    /// Adds tags, keeping the existing ones.
    Tag {
        /// Tags to add.
        tags: Vec<String>,
    },
    /// Sets `status`.
    Status {
        /// New status.
        status: String,
    },
    /// Moves deals to a pipeline stage.
    Stage {
        /// Target stage.
        stage_id: String,
        /// New win probability (0-100).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        probability: Option<i64>,
    },
    /// Deletes the records. Admin only.
    Delete,
    /// Exports the records to CSV.
    Export {
        /// Field paths; empty means the kind's default list.
        #[serde(default)]
        fields: Vec<String>,
        /// Load related records so dotted paths resolve.
        #[serde(default)]
        include_relations: bool,
        /// How header cells are rendered.
        #[serde(default)]
        header_format: HeaderFormat,
    },
}

impl BulkAction {
    /// Returns the action name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Tag { .. } => "tag",
            Self::Status { .. } => "status",
            Self::Stage { .. } => "stage",
            Self::Delete => "delete",
            Self::Export { .. } => "export",
        }
    }

    /// Checks the payload against the target kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty payloads, stage changes on
    /// anything but deals and probabilities outside 0-100.
    pub fn validate(&self, kind: EntityKind) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidInput(format!("{}: {msg}", self.name())));
        match self {
            Self::Assign { owner_id } if owner_id.as_str().trim().is_empty() => {
                invalid("owner id is required")
            },
            Self::Tag { tags } if tags.iter().all(|t| t.trim().is_empty()) => {
                invalid("at least one tag is required")
            },
            Self::Status { status } if status.trim().is_empty() => invalid("status is required"),
            Self::Stage { .. } if kind != EntityKind::Deal => {
                invalid("stage changes apply to deals only")
            },
            Self::Stage { stage_id, .. } if stage_id.trim().is_empty() => {
                invalid("stage id is required")
            },
            Self::Stage {
                probability: Some(p),
                ..
            } if !(0..=100).contains(p) => invalid("probability must be between 0 and 100"),
            _ => Ok(()),
        }
    }

    /// Fields written by a plain update, for actions that have one.
    fn update_fields(&self) -> Option<FieldMap> {
        let mut fields = FieldMap::new();
        match self {
            Self::Assign { owner_id } => {
                fields.insert("owner_id".to_string(), FieldValue::from(owner_id.as_str()));
            },
            Self::Status { status } => {
                fields.insert("status".to_string(), FieldValue::from(status.trim()));
            },
            Self::Stage {
                stage_id,
                probability,
            } => {
                fields.insert("stage_id".to_string(), FieldValue::from(stage_id.trim()));
                if let Some(p) = probability {
                    fields.insert("probability".to_string(), FieldValue::Integer(*p));
                }
            },
            Self::Tag { .. } | Self::Delete | Self::Export { .. } => return None,
        }
        Some(fields)
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bulk action and the records it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkActionRequest {
    /// Kind of the targeted records.
    pub entity_kind: EntityKind,
    /// Targeted record ids.
    pub entity_ids: BTreeSet<RecordId>,
    /// Action to apply.
    pub action: BulkAction,
}

impl BulkActionRequest {
    /// Creates a request.
    #[must_use]
    pub fn new<I, T>(entity_kind: EntityKind, entity_ids: I, action: BulkAction) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordId>,
    {
        Self {
            entity_kind,
            entity_ids: entity_ids.into_iter().map(Into::into).collect(),
            action,
        }
    }
}

/// What a bulk run does when a record fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it.
    #[default]
    AbortOnFirstError,
    /// Process every record and report failures in the outcome.
    ContinueOnError,
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "abort" | "abort_on_first_error" => Ok(Self::AbortOnFirstError),
            "continue" | "continue_on_error" => Ok(Self::ContinueOnError),
            other => Err(Error::InvalidInput(format!("unknown failure policy: {other}"))),
        }
    }
}

/// A record the action could not be applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    /// The record.
    pub id: RecordId,
    /// What went wrong.
    pub message: String,
}

/// Summary of an applied mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Records successfully changed.
    pub affected: usize,
    /// Records that failed (only under [`FailurePolicy::ContinueOnError`]).
    pub failures: Vec<BulkFailure>,
}

impl BulkReport {
    /// Returns true if no record failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of [`BulkService::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    /// A mutation ran.
    Applied(BulkReport),
    /// The records were exported.
    Exported(ExportResult),
}

/// Service applying bulk actions.
pub struct BulkService {
    records: Arc<dyn RecordStore>,
    exporter: ExportService,
    access: AccessControl,
    policy: FailurePolicy,
}

impl BulkService {
    /// Creates a bulk service with default access rules and policy.
    #[must_use]
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            exporter: ExportService::new(Arc::clone(&records)),
            records,
            access: AccessControl::new(),
            policy: FailurePolicy::default(),
        }
    }

    /// Replaces the access rules.
    #[must_use]
    pub fn with_access_control(mut self, access: AccessControl) -> Self {
        self.exporter = self.exporter.with_access_control(access.clone());
        self.access = access;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Applies a bulk action.
    ///
    /// Permission and payload checks happen before any record is touched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty id set or a bad payload,
    /// [`Error::PermissionDenied`] if the actor may not run the action and,
    /// under [`FailurePolicy::AbortOnFirstError`], the first store error.
    #[instrument(
        skip(self, request, actor),
        fields(
            action = request.action.name(),
            entity_kind = %request.entity_kind,
            targets = request.entity_ids.len(),
            user.id = %actor.id
        )
    )]
    pub fn apply(&self, request: &BulkActionRequest, actor: &Actor) -> Result<BulkOutcome> {
        let start = Instant::now();
        let action = request.action.name();

        let result = self.apply_inner(request, actor);

        let status = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("bulk_actions_total", "action" => action, "status" => status)
            .increment(1);
        metrics::histogram!("bulk_action_duration_ms", "action" => action)
            .record(start.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn apply_inner(&self, request: &BulkActionRequest, actor: &Actor) -> Result<BulkOutcome> {
        if request.entity_ids.is_empty() {
            return Err(Error::InvalidInput(
                "bulk action needs at least one record id".to_string(),
            ));
        }
        request.action.validate(request.entity_kind)?;
        self.authorize(&request.action, actor)?;

        if let BulkAction::Export {
            fields,
            include_relations,
            header_format,
        } = &request.action
        {
            let options = ExportOptions::new(request.entity_kind)
                .with_fields(fields.iter().cloned())
                .with_filter(RecordFilter::new().with_ids(request.entity_ids.iter().cloned()))
                .with_relations(*include_relations)
                .with_header_format(*header_format);
            return self.exporter.export(&options, actor).map(BulkOutcome::Exported);
        }

        let mut report = BulkReport::default();
        for id in &request.entity_ids {
            match self.apply_one(request.entity_kind, id, &request.action) {
                Ok(()) => report.affected += 1,
                Err(e) => match self.policy {
                    FailurePolicy::AbortOnFirstError => {
                        tracing::warn!(
                            record.id = %id,
                            affected = report.affected,
                            error = %e,
                            "Bulk action aborted"
                        );
                        return Err(e);
                    },
                    FailurePolicy::ContinueOnError => {
                        tracing::debug!(record.id = %id, error = %e, "Bulk action failed for record");
                        report.failures.push(BulkFailure {
                            id: id.clone(),
                            message: e.to_string(),
                        });
                    },
                },
            }
        }

        tracing::info!(
            affected = report.affected,
            failed = report.failures.len(),
            "Bulk action applied"
        );
        Ok(BulkOutcome::Applied(report))
    }

    fn authorize(&self, action: &BulkAction, actor: &Actor) -> Result<()> {
        match action {
            BulkAction::Delete => {
                if !actor.role.is_elevated() {
                    tracing::warn!(user.id = %actor.id, role = %actor.role, "Bulk delete refused");
                    metrics::counter!("access_denied_total", "permission" => "bulk_delete")
                        .increment(1);
                    return Err(Error::PermissionDenied {
                        action: "bulk delete".to_string(),
                        reason: format!("requires the admin role, {} is {}", actor.id, actor.role),
                    });
                }
                self.access
                    .require(actor, Permission::BulkDelete, "bulk delete")
            },
            BulkAction::Export { .. } => {
                self.access.require(actor, Permission::Export, "bulk export")
            },
            BulkAction::Assign { .. }
            | BulkAction::Tag { .. }
            | BulkAction::Status { .. }
            | BulkAction::Stage { .. } => {
                self.access
                    .require(actor, Permission::BulkUpdate, "bulk update")
            },
        }
    }

    fn apply_one(&self, kind: EntityKind, id: &RecordId, action: &BulkAction) -> Result<()> {
        match action {
            BulkAction::Delete => self.records.delete(kind, id),
            BulkAction::Tag { tags } => {
                let record = self.records.get(kind, id)?.ok_or_else(|| Error::NotFound {
                    kind,
                    id: id.clone(),
                })?;
                let merged = FieldValue::tags(record.tags().iter().chain(tags.iter()));
                let mut fields = FieldMap::new();
                fields.insert("tags".to_string(), merged);
                self.records.update(kind, id, fields)
            },
            other => match other.update_fields() {
                Some(fields) => self.records.update(kind, id, fields),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Role;
    use crate::storage::InMemoryRecordStore;
    use test_case::test_case;

    fn deal(title: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::from(title));
        fields
    }

    fn store_with_deals() -> Arc<InMemoryRecordStore> {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_with_id(EntityKind::Deal, "d1", deal("Renewal")).unwrap();
        store.insert_with_id(EntityKind::Deal, "d2", deal("Upsell")).unwrap();
        store
    }

    fn admin() -> Actor {
        Actor::new("root", Role::Admin)
    }

    #[test]
    fn test_stage_sets_probability() {
        let store = store_with_deals();
        let service = BulkService::new(store.clone());
        let request = BulkActionRequest::new(
            EntityKind::Deal,
            ["d1", "d2"],
            BulkAction::Stage {
                stage_id: "negotiation".to_string(),
                probability: Some(60),
            },
        );
        let outcome = service.apply(&request, &admin()).unwrap();
        assert_eq!(
            outcome,
            BulkOutcome::Applied(BulkReport {
                affected: 2,
                failures: vec![],
            })
        );
        let record = store.get(EntityKind::Deal, &RecordId::new("d1")).unwrap().unwrap();
        assert_eq!(record.text("stage_id"), Some("negotiation"));
        assert_eq!(record.fields.get("probability"), Some(&FieldValue::Integer(60)));
    }

    #[test_case(BulkAction::Assign { owner_id: UserId::new(" ") } ; "blank owner")]
    #[test_case(BulkAction::Tag { tags: vec![" ".to_string()] } ; "blank tags")]
    #[test_case(BulkAction::Status { status: String::new() } ; "blank status")]
    #[test_case(BulkAction::Stage { stage_id: "won".to_string(), probability: Some(101) } ; "probability out of range")]
    fn test_invalid_payload(action: BulkAction) {
        let service = BulkService::new(store_with_deals());
        let request = BulkActionRequest::new(EntityKind::Deal, ["d1"], action);
        let err = service.apply(&request, &admin()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_stage_rejected_for_contacts() {
        let service = BulkService::new(Arc::new(InMemoryRecordStore::new()));
        let request = BulkActionRequest::new(
            EntityKind::Contact,
            ["c1"],
            BulkAction::Stage {
                stage_id: "won".to_string(),
                probability: None,
            },
        );
        assert!(matches!(
            service.apply(&request, &admin()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_ids_rejected() {
        let service = BulkService::new(store_with_deals());
        let request = BulkActionRequest::new(EntityKind::Deal, Vec::<RecordId>::new(), BulkAction::Delete);
        assert!(matches!(
            service.apply(&request, &admin()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_viewer_cannot_update() {
        let service = BulkService::new(store_with_deals());
        let request = BulkActionRequest::new(
            EntityKind::Deal,
            ["d1"],
            BulkAction::Status {
                status: "lost".to_string(),
            },
        );
        let err = service
            .apply(&request, &Actor::new("v", Role::Viewer))
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied { .. }));
    }

    #[test]
    fn test_export_limited_to_selection() {
        let service = BulkService::new(store_with_deals());
        let request = BulkActionRequest::new(
            EntityKind::Deal,
            ["d2"],
            BulkAction::Export {
                fields: vec!["title".to_string()],
                include_relations: false,
                header_format: HeaderFormat::SnakeCase,
            },
        );
        match service.apply(&request, &Actor::new("v", Role::Viewer)).unwrap() {
            BulkOutcome::Exported(result) => {
                assert_eq!(result.csv, "title\nUpsell\n");
                assert_eq!(result.exported, 1);
            },
            BulkOutcome::Applied(_) => panic!("expected an export"),
        }
    }

    #[test]
    fn test_action_serde_shape() {
        let json = r#"{"action":"stage","stage_id":"won"}"#;
        let action: BulkAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            BulkAction::Stage {
                stage_id: "won".to_string(),
                probability: None,
            }
        );
        let delete: BulkAction = serde_json::from_str(r#"{"action":"delete"}"#).unwrap();
        assert_eq!(delete, BulkAction::Delete);
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!(
            "continue".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::ContinueOnError
        );
        assert_eq!(
            "abort-on-first-error".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::AbortOnFirstError
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
