//! CSV import/export subsystem.
//!
//! # Architecture
//!
//! - **Formats** turn raw text into a [`CsvTable`] and records back into CSV
//! - **Mapping** infers and validates which column feeds which field
//! - **Validation** coerces one row into typed field values
//! - **Services** orchestrate the above against the record and audit stores
//!
//! # Examples
//!
//! ## Import contacts
//!
//! ```rust,ignore
//! use crm_transfer::io::{ImportOptions, ImportService, DuplicateStrategy};
//!
//! let table = service.parse(&raw_text)?;
//! let mut preview = service.preview(&table, EntityKind::Contact, &actor)?;
//! preview.mapping[3].retarget("", EntityKind::Contact);
//! let options = ImportOptions::new(EntityKind::Contact)
//!     .with_strategy(DuplicateStrategy::Update)
//!     .with_file_name("contacts.csv");
//! let log = service.run(&table, &preview.mapping, &options, &actor, None)?;
//! println!("{} imported, {} failed", log.success_count, log.error_count);
//! ```
//!
//! ## Export organizations
//!
//! ```rust,ignore
//! use crm_transfer::io::{ExportOptions, ExportService, HeaderFormat};
//!
//! let options = ExportOptions::new(EntityKind::Organization)
//!     .with_fields(["name", "industry"])
//!     .with_header_format(HeaderFormat::Readable);
//! let result = service.export(&options, &actor)?;
//! std::fs::write(&result.file_name, result.csv)?;
//! ```

pub mod field_path;
pub mod formats;
pub mod mapping;
pub mod services;
pub mod validation;

// Re-exports for convenience
pub use field_path::{FieldPath, HeaderFormat};
pub use formats::{CsvExportSink, CsvOptions, CsvTable};
pub use mapping::{ColumnMapper, ColumnMapping, ImportPreview, MappingError};
pub use services::duplicate::{DuplicateResolver, DuplicateStrategy, Resolution};
pub use services::export::{ExportOptions, ExportResult, ExportService};
pub use services::import::{
    CancellationToken, ImportOptions, ImportProgress, ImportService, ProgressCallback,
};
pub use validation::{RowValidator, ValidationIssue, ValidationResult, ValidationSeverity};
