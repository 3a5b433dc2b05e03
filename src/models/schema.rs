//! Per-kind field schemas.
//!
//! Every write request and mapping target is checked against these fixed
//! definitions instead of accepting an open key/value payload.
//!
//! | Kind | Required | Duplicate key |
//! |------|----------|---------------|
//! | contacts | `first_name`, `last_name` | `email` |
//! | organizations | `name` | `domain` |
//! | deals | `title` | `title` |

use super::{EntityKind, FieldType};

/// Definition of one field of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name (`snake_case`).
    pub name: &'static str,
    /// Declared value type.
    pub field_type: FieldType,
    /// Whether a record cannot exist without this field.
    pub required: bool,
    /// Whether CSV import may target this field.
    ///
    /// System-maintained fields (`created_at`, `created_by`) are not.
    pub importable: bool,
}

impl FieldSpec {
    const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            importable: true,
        }
    }

    const fn required(name: &'static str) -> Self {
        Self {
            name,
            field_type: FieldType::Text,
            required: true,
            importable: true,
        }
    }

    const fn system(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            required: false,
            importable: false,
        }
    }
}

/// A to-one relation resolved through a foreign key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationSpec {
    /// Relation name used in field paths (`company.name`).
    pub name: &'static str,
    /// Field holding the related record's id.
    pub foreign_key: &'static str,
    /// Kind of the related record.
    pub target: EntityKind,
}

/// Fixed schema of an entity kind.
#[derive(Debug)]
pub struct EntitySchema {
    /// The kind described.
    pub kind: EntityKind,
    /// All recognized fields, in canonical order.
    pub fields: &'static [FieldSpec],
    /// Natural key used to detect duplicates on import.
    pub duplicate_key: &'static str,
    /// Field paths exported when the caller selects none.
    pub default_export_fields: &'static [&'static str],
    /// Relations available for export flattening.
    pub relations: &'static [RelationSpec],
}

impl EntitySchema {
    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the declared type of a field.
    #[must_use]
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field(name).map(|f| f.field_type)
    }

    /// Returns the names of required fields.
    #[must_use]
    pub fn required_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect()
    }

    /// Returns whether a field is required.
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.required)
    }

    /// Returns whether import may target a field.
    #[must_use]
    pub fn is_importable(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.importable)
    }

    /// Looks up a relation by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&'static RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Returns every persisted field name, in canonical order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }
}

const CONTACT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("first_name"),
    FieldSpec::required("last_name"),
    FieldSpec::optional("email", FieldType::Text),
    FieldSpec::optional("phone", FieldType::Text),
    FieldSpec::optional("title", FieldType::Text),
    FieldSpec::optional("status", FieldType::Text),
    FieldSpec::optional("lead_score", FieldType::Integer),
    FieldSpec::optional("tags", FieldType::Tags),
    FieldSpec::optional("notes", FieldType::Text),
    FieldSpec::optional("company_id", FieldType::Text),
    FieldSpec::optional("owner_id", FieldType::Text),
    FieldSpec::system("created_by", FieldType::Text),
    FieldSpec::system("created_at", FieldType::Timestamp),
];

const ORGANIZATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name"),
    FieldSpec::optional("domain", FieldType::Text),
    FieldSpec::optional("industry", FieldType::Text),
    FieldSpec::optional("size", FieldType::Text),
    FieldSpec::optional("website", FieldType::Text),
    FieldSpec::optional("phone", FieldType::Text),
    FieldSpec::optional("address", FieldType::Text),
    FieldSpec::optional("status", FieldType::Text),
    FieldSpec::optional("tags", FieldType::Tags),
    FieldSpec::optional("notes", FieldType::Text),
    FieldSpec::optional("owner_id", FieldType::Text),
    FieldSpec::system("created_by", FieldType::Text),
    FieldSpec::system("created_at", FieldType::Timestamp),
];

const DEAL_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("title"),
    FieldSpec::optional("value", FieldType::Float),
    FieldSpec::optional("currency", FieldType::Text),
    FieldSpec::optional("stage_id", FieldType::Text),
    FieldSpec::optional("probability", FieldType::Integer),
    FieldSpec::optional("expected_close_date", FieldType::Date),
    FieldSpec::optional("status", FieldType::Text),
    FieldSpec::optional("tags", FieldType::Tags),
    FieldSpec::optional("notes", FieldType::Text),
    FieldSpec::optional("contact_id", FieldType::Text),
    FieldSpec::optional("company_id", FieldType::Text),
    FieldSpec::optional("owner_id", FieldType::Text),
    FieldSpec::system("created_by", FieldType::Text),
    FieldSpec::system("created_at", FieldType::Timestamp),
];

static CONTACT_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Contact,
    fields: CONTACT_FIELDS,
    duplicate_key: "email",
    default_export_fields: &[
        "first_name",
        "last_name",
        "email",
        "phone",
        "title",
        "status",
        "lead_score",
        "tags",
        "created_at",
    ],
    relations: &[RelationSpec {
        name: "company",
        foreign_key: "company_id",
        target: EntityKind::Organization,
    }],
};

static ORGANIZATION_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Organization,
    fields: ORGANIZATION_FIELDS,
    duplicate_key: "domain",
    default_export_fields: &[
        "name",
        "domain",
        "industry",
        "size",
        "website",
        "phone",
        "tags",
        "created_at",
    ],
    relations: &[],
};

static DEAL_SCHEMA: EntitySchema = EntitySchema {
    kind: EntityKind::Deal,
    fields: DEAL_FIELDS,
    // Titles are not unique; kept as the natural key to match existing behavior.
    duplicate_key: "title",
    default_export_fields: &[
        "title",
        "value",
        "currency",
        "stage_id",
        "probability",
        "expected_close_date",
        "status",
        "tags",
        "created_at",
    ],
    relations: &[
        RelationSpec {
            name: "contact",
            foreign_key: "contact_id",
            target: EntityKind::Contact,
        },
        RelationSpec {
            name: "company",
            foreign_key: "company_id",
            target: EntityKind::Organization,
        },
    ],
};

impl EntityKind {
    /// Returns the fixed schema for this kind.
    #[must_use]
    pub const fn schema(&self) -> &'static EntitySchema {
        match self {
            Self::Contact => &CONTACT_SCHEMA,
            Self::Organization => &ORGANIZATION_SCHEMA,
            Self::Deal => &DEAL_SCHEMA,
        }
    }

    /// Returns the natural key field used for duplicate detection.
    #[must_use]
    pub const fn duplicate_key(&self) -> &'static str {
        self.schema().duplicate_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields() {
        assert_eq!(
            EntityKind::Contact.schema().required_fields(),
            vec!["first_name", "last_name"]
        );
        assert_eq!(EntityKind::Organization.schema().required_fields(), vec!["name"]);
        assert_eq!(EntityKind::Deal.schema().required_fields(), vec!["title"]);
    }

    #[test]
    fn test_duplicate_keys() {
        assert_eq!(EntityKind::Contact.duplicate_key(), "email");
        assert_eq!(EntityKind::Organization.duplicate_key(), "domain");
        assert_eq!(EntityKind::Deal.duplicate_key(), "title");
    }

    #[test]
    fn test_numeric_fields() {
        let contact = EntityKind::Contact.schema();
        assert_eq!(contact.field_type("lead_score"), Some(FieldType::Integer));
        let deal = EntityKind::Deal.schema();
        assert_eq!(deal.field_type("value"), Some(FieldType::Float));
        assert_eq!(deal.field_type("probability"), Some(FieldType::Integer));
        assert_eq!(deal.field_type("expected_close_date"), Some(FieldType::Date));
    }

    #[test]
    fn test_system_fields_not_importable() {
        for kind in EntityKind::all() {
            let schema = kind.schema();
            assert!(!schema.is_importable("created_at"));
            assert!(!schema.is_importable("created_by"));
            assert!(schema.is_importable("tags"));
        }
    }

    #[test]
    fn test_default_export_fields_exist() {
        for kind in EntityKind::all() {
            let schema = kind.schema();
            for field in schema.default_export_fields {
                assert!(schema.field(field).is_some(), "{kind}: {field}");
            }
        }
    }

    #[test]
    fn test_relations() {
        let deal = EntityKind::Deal.schema();
        assert_eq!(
            deal.relation("company").map(|r| r.target),
            Some(EntityKind::Organization)
        );
        assert!(EntityKind::Organization.schema().relation("company").is_none());
    }
}
