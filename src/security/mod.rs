//! Security features.
//!
//! Role-based permission gating for imports, exports and bulk actions.

pub mod rbac;

pub use rbac::{AccessControl, AccessResult, Permission, Role};
