//! The acting user passed into every engine call.

use crate::security::Role;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An authenticated user and their role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User identifier.
    pub id: UserId,
    /// Role granted to the user.
    pub role: Role,
}

impl Actor {
    /// Creates an actor.
    #[must_use]
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// Source of the currently authenticated user.
///
/// Hosts adapt their session layer to this trait and resolve the actor
/// once per request with [`require_actor`].
pub trait IdentityProvider: Send + Sync {
    /// Returns the authenticated user, if any.
    fn current_user(&self) -> Option<Actor>;
}

/// Identity provider with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<Actor>);

impl StaticIdentity {
    /// Provider that always returns `actor`.
    #[must_use]
    pub const fn new(actor: Actor) -> Self {
        Self(Some(actor))
    }

    /// Provider with no authenticated user.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<Actor> {
        self.0.clone()
    }
}

/// Resolves the acting user or fails with [`Error::Unauthorized`].
///
/// # Errors
///
/// Returns [`Error::Unauthorized`] if the provider has no user.
pub fn require_actor(provider: &dyn IdentityProvider) -> Result<Actor> {
    provider
        .current_user()
        .ok_or_else(|| Error::Unauthorized("no authenticated user".to_string()))
}
