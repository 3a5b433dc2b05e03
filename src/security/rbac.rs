//! Role-based access control for transfer operations.
//!
//! # Roles
//!
//! | Role | Description | Key Permissions |
//! |------|-------------|-----------------|
//! | `Admin` | Full access, the elevated role | All permissions |
//! | `Manager` | Team lead | Import, Export, `BulkUpdate`, `ViewImportLogs` |
//! | `Member` | Standard user | Import, Export, `BulkUpdate`, `ViewImportLogs` |
//! | `Viewer` | Read-only access | Export, `ViewImportLogs` |
//!
//! Bulk deletion is irreversible and is reserved for the elevated role.
//!
//! # Example
//!
//! ```rust
//! use crm_transfer::security::{AccessControl, Permission, Role};
//!
//! let ac = AccessControl::new();
//! assert!(ac.has_permission(&Role::Admin, &Permission::BulkDelete));
//! assert!(!ac.has_permission(&Role::Manager, &Permission::BulkDelete));
//! assert!(ac.has_permission(&Role::Viewer, &Permission::Export));
//! ```

use crate::models::Actor;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// User roles with predefined permission sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Workspace administrator; the elevated role.
    Admin,
    /// Team manager.
    Manager,
    /// Standard member.
    Member,
    /// Read-only viewer.
    Viewer,
}

impl Role {
    /// Returns all available roles.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Admin, Self::Manager, Self::Member, Self::Viewer]
    }

    /// Returns the display name for the role.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Administrator",
            Self::Manager => "Manager",
            Self::Member => "Member",
            Self::Viewer => "Viewer",
        }
    }

    /// Returns true for the role allowed to perform irreversible actions.
    #[must_use]
    pub const fn is_elevated(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Parses a role name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" | "administrator" | "owner" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "member" | "user" => Some(Self::Member),
            "viewer" | "readonly" | "read_only" => Some(Self::Viewer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Permissions for transfer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Run CSV imports.
    Import,
    /// Export records to CSV.
    Export,
    /// Apply non-destructive bulk mutations.
    BulkUpdate,
    /// Delete records in bulk.
    BulkDelete,
    /// Read own import logs.
    ViewImportLogs,
}

impl Permission {
    /// Returns all available permissions.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Import,
            Self::Export,
            Self::BulkUpdate,
            Self::BulkDelete,
            Self::ViewImportLogs,
        ]
    }

    /// Returns the display name for the permission.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Import => "Import Records",
            Self::Export => "Export Records",
            Self::BulkUpdate => "Bulk Update",
            Self::BulkDelete => "Bulk Delete",
            Self::ViewImportLogs => "View Import Logs",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Result of an access control check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessResult {
    /// Access granted.
    Granted,
    /// Access denied with reason.
    Denied(String),
}

impl AccessResult {
    /// Returns true if access was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    /// Returns true if access was denied.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

/// Access control manager for checking role permissions.
#[derive(Debug, Clone)]
pub struct AccessControl {
    role_permissions: HashMap<Role, HashSet<Permission>>,
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessControl {
    /// Creates an access control instance with the default role mappings.
    #[must_use]
    pub fn new() -> Self {
        let mut role_permissions = HashMap::new();

        role_permissions.insert(Role::Admin, Permission::all().iter().copied().collect());

        let contributor: HashSet<Permission> = [
            Permission::Import,
            Permission::Export,
            Permission::BulkUpdate,
            Permission::ViewImportLogs,
        ]
        .into_iter()
        .collect();
        role_permissions.insert(Role::Manager, contributor.clone());
        role_permissions.insert(Role::Member, contributor);

        role_permissions.insert(
            Role::Viewer,
            [Permission::Export, Permission::ViewImportLogs]
                .into_iter()
                .collect(),
        );

        Self { role_permissions }
    }

    /// Checks if a role has a specific permission.
    #[must_use]
    pub fn has_permission(&self, role: &Role, permission: &Permission) -> bool {
        self.role_permissions
            .get(role)
            .is_some_and(|perms| perms.contains(permission))
    }

    /// Checks access and returns a detailed result.
    #[must_use]
    pub fn check_access(&self, role: &Role, permission: &Permission) -> AccessResult {
        if self.has_permission(role, permission) {
            AccessResult::Granted
        } else {
            AccessResult::Denied(format!(
                "role '{}' does not have permission '{}'",
                role.display_name(),
                permission.display_name()
            ))
        }
    }

    /// Fails with [`Error::PermissionDenied`] unless the actor holds `permission`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] naming `action` when access is denied.
    pub fn require(&self, actor: &Actor, permission: Permission, action: &str) -> Result<()> {
        match self.check_access(&actor.role, &permission) {
            AccessResult::Granted => Ok(()),
            AccessResult::Denied(reason) => {
                tracing::warn!(
                    user_id = %actor.id,
                    role = %actor.role,
                    action,
                    "Access denied"
                );
                metrics::counter!(
                    "access_denied_total",
                    "permission" => permission.display_name()
                )
                .increment(1);
                Err(Error::PermissionDenied {
                    action: action.to_string(),
                    reason,
                })
            },
        }
    }

    /// Returns all permissions for a role.
    #[must_use]
    pub fn permissions_for(&self, role: &Role) -> HashSet<Permission> {
        self.role_permissions.get(role).cloned().unwrap_or_default()
    }

    /// Adds a permission to a role.
    ///
    /// [`Permission::BulkDelete`] is only ever effective for the elevated
    /// role; bulk delete checks [`Role::is_elevated`] as well.
    pub fn grant_permission(&mut self, role: &Role, permission: Permission) {
        self.role_permissions
            .entry(*role)
            .or_default()
            .insert(permission);
    }

    /// Removes a permission from a role.
    pub fn revoke_permission(&mut self, role: &Role, permission: &Permission) {
        if let Some(perms) = self.role_permissions.get_mut(role) {
            perms.remove(permission);
        }
    }
}
