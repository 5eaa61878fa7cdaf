//! Authenticated callers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the person performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Admin,
    Accountant,
    Teacher,
}

impl ActorRole {
    /// Constrained roles have their fee changes escalated to administrators
    pub fn is_constrained(&self) -> bool {
        !matches!(self, ActorRole::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Accountant => "accountant",
            ActorRole::Teacher => "teacher",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-authenticated caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_is_unconstrained() {
        assert!(!ActorRole::Admin.is_constrained());
        assert!(ActorRole::Accountant.is_constrained());
        assert!(ActorRole::Teacher.is_constrained());
    }
}
