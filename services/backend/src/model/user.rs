//! User model definitions and the profile patch payload.
//!
//! # Purpose
//! Defines the account records shared by the store, the access guard, and the
//! HTTP API. Both admins and agents are users; the role field tells them
//! apart.
use chrono::{DateTime, Utc};
use dataflex_common::ids::UserId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Access level attached to a user account.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent or admin account.
///
/// `email`, `role`, and `agent_code` are fixed at registration; the profile
/// patch endpoint rejects attempts to change them.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct User {
    #[schema(value_type = String)]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    /// Six-character resale code, also accepted as a bearer credential.
    pub agent_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update. Absent fields are left untouched.
///
/// Immutable fields are still listed here so that a request naming one can be
/// rejected explicitly instead of being silently dropped.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserPatchRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub agent_code: Option<String>,
}
