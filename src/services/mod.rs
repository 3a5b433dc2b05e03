//! Business logic services.
//!
//! Services orchestrate storage backends and provide high-level operations.
//! Import and export live under [`crate::io::services`]; this module holds
//! bulk actions over selected records.

mod bulk;

pub use bulk::{
    BulkAction, BulkActionRequest, BulkFailure, BulkOutcome, BulkReport, BulkService,
    FailurePolicy,
};
