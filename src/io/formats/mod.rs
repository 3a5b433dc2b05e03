//! File format adapters.
//!
//! Delimited text with a header row is the only supported format.

pub mod csv;

pub use self::csv::{CsvExportSink, CsvOptions, CsvTable};
