//! Import and export service implementations.
//!
//! Orchestrates parsing, mapping, validation, duplicate resolution and
//! storage operations.

pub mod duplicate;
pub mod export;
pub mod import;

pub use duplicate::{DuplicateResolver, DuplicateStrategy, Resolution};
pub use export::{ExportOptions, ExportProgressCallback, ExportResult, ExportService, file_name};
pub use import::{
    CancellationToken, ImportOptions, ImportProgress, ImportService, ProgressCallback,
};
