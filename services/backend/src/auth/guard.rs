//! Request guards for the bearer-credential scheme.
//!
//! # Purpose
//! Resolves the `Authorization: Bearer` credential into an [`Identity`] and
//! enforces role requirements. Two credentials exist: the configured admin
//! token, and an agent's six-character resale code.
use crate::api::error::{ApiError, api_forbidden, api_internal, api_unauthorized};
use crate::app::AppState;
use crate::model::Role;
use axum::http::HeaderMap;
use dataflex_common::ids::UserId;

/// Resolved caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

/// Whether `role` satisfies `required`.
///
/// Admins satisfy every requirement, agents satisfy only the agent level,
/// and anonymous callers satisfy nothing.
pub fn can_access(role: Option<Role>, required: Role) -> bool {
    match role {
        Some(Role::Admin) => true,
        Some(Role::Agent) => required == Role::Agent,
        None => false,
    }
}

/// Resolve the bearer credential into an identity.
///
/// The admin token is checked first; anything else is treated as an agent
/// code and looked up in the store. Agent codes authenticate agents only, so
/// the admin account is reachable solely through the admin token.
pub async fn require_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Identity, ApiError> {
    let bearer =
        extract_bearer(headers).ok_or_else(|| api_unauthorized("missing bearer token"))?;
    if state
        .admin_token
        .as_deref()
        .is_some_and(|token| token == bearer)
    {
        return Ok(Identity {
            user_id: state.admin_user_id,
            role: Role::Admin,
        });
    }
    match state.store.find_user_by_agent_code(bearer).await {
        Ok(Some(user)) if user.role == Role::Agent => Ok(Identity {
            user_id: user.id,
            role: Role::Agent,
        }),
        Ok(_) => Err(api_unauthorized("unknown credential")),
        Err(err) => Err(api_internal("failed to resolve credential", &err)),
    }
}

pub async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let identity = require_identity(state, headers).await?;
    if !can_access(Some(identity.role), Role::Admin) {
        return Err(api_forbidden("admin role required"));
    }
    Ok(identity)
}

/// Admit the account owner or an admin, reject everyone else.
pub async fn require_self_or_admin(
    state: &AppState,
    headers: &HeaderMap,
    user_id: &UserId,
) -> Result<Identity, ApiError> {
    let identity = require_identity(state, headers).await?;
    if identity.role != Role::Admin && identity.user_id != *user_id {
        return Err(api_forbidden("not your account"));
    }
    Ok(identity)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?;
    let value = value.to_str().ok()?;
    value.strip_prefix("Bearer ")
}
