//! Operation Context
//!
//! Carries the acting account into every operation, for role gating,
//! auditing and tracing. Nothing here is process-wide state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::DomainError;

/// Platform role of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Executor,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Executor => "executor",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }

    /// Admins and moderators
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "executor" => Ok(Role::Executor),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(DomainError::Validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Context for an operation: who is acting, in which role, under which
/// correlation ID. The calling layer builds it from an authenticated session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Authenticated account performing the operation
    pub actor_id: Uuid,

    /// Role the actor holds at request time
    pub actor_role: Role,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    pub fn new(actor_id: Uuid, actor_role: Role) -> Self {
        Self {
            actor_id,
            actor_role,
            correlation_id: None,
        }
    }

    /// Context for work the platform performs on its own behalf
    pub fn system() -> Self {
        Self::new(Uuid::nil(), Role::Admin)
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn is_staff(&self) -> bool {
        self.actor_role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.actor_role == Role::Admin
    }

    /// Fail with `Unauthorized` unless the actor is an admin or moderator
    pub fn require_staff(&self, action: &str) -> Result<(), DomainError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "{action} requires an admin or moderator, actor is {}",
                self.actor_role
            )))
        }
    }

    /// Fail with `Unauthorized` unless the actor is an admin
    pub fn require_admin(&self, action: &str) -> Result<(), DomainError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(DomainError::unauthorized(format!(
                "{action} requires an admin, actor is {}",
                self.actor_role
            )))
        }
    }
}
