//! Agent directory API handlers.
//!
//! # Purpose
//! Registration, admin listing, profile reads/updates, and the cascading
//! account delete. Everything except registration sits behind the guard.
use crate::analytics::order_counts_by_user;
use crate::api::error::{
    ApiError, api_conflict, api_immutable_field, api_internal, api_not_found,
    api_validation_error,
};
use crate::api::types::{
    AgentListResponse, AgentSummary, OrderListResponse, RegisterAgentRequest,
};
use crate::app::AppState;
use crate::auth::codes::generate_agent_code;
use crate::auth::{require_admin, require_self_or_admin};
use crate::model::{Role, User, UserPatchRequest};
use crate::store::{BundleStore, StoreError};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use dataflex_common::ids::UserId;
use std::str::FromStr;

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    UserId::from_str(raw).map_err(|_| api_validation_error("user id must be a UUID"))
}

#[utoipa::path(
    post,
    path = "/v1/agents",
    tag = "agents",
    request_body = RegisterAgentRequest,
    responses(
        (status = 201, description = "Agent registered", body = User),
        (status = 409, description = "Email already registered", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn register_agent(
    State(state): State<AppState>,
    Json(body): Json<RegisterAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    let email = body.email.trim();
    if name.is_empty() {
        return Err(api_validation_error("name must not be empty"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(api_validation_error("email must be a valid address"));
    }
    let phone = body
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    let user =
        create_agent_account(state.store.as_ref(), name, email, phone, generate_agent_code)
            .await?;
    tracing::info!(user_id = %user.id, "agent registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// How many fresh codes registration tries before giving up.
const CODE_RETRY_LIMIT: usize = 3;

/// Creates the agent account. A duplicate can mean either a taken email or a
/// random agent-code collision; the latter is retried with a fresh code so it
/// never surfaces to the caller as a spurious conflict.
async fn create_agent_account(
    store: &dyn BundleStore,
    name: &str,
    email: &str,
    phone: Option<String>,
    mut next_code: impl FnMut() -> String,
) -> Result<User, ApiError> {
    for _ in 0..CODE_RETRY_LIMIT {
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            name: name.to_string(),
            email: email.to_string(),
            role: Role::Agent,
            phone: phone.clone(),
            agent_code: next_code(),
            created_at: now,
            updated_at: now,
        };
        match store.create_user(user).await {
            Ok(user) => return Ok(user),
            Err(StoreError::Duplicate(_)) => {
                let email_taken = store
                    .find_user_by_email(email)
                    .await
                    .map_err(|err| api_internal("failed to look up email", &err))?
                    .is_some();
                if email_taken {
                    return Err(api_conflict("already_exists", "email already registered"));
                }
                // Agent code collision; loop with a fresh one.
            }
            Err(err) => return Err(api_internal("failed to register agent", &err)),
        }
    }
    Err(api_internal(
        "failed to allocate an agent code",
        &StoreError::Duplicate("agent code".into()),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/agents",
    tag = "agents",
    responses(
        (status = 200, description = "Agents with their order counts", body = AgentListResponse),
        (status = 403, description = "Admin role required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AgentListResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    let agents = state
        .store
        .list_agents()
        .await
        .map_err(|err| api_internal("failed to list agents", &err))?;
    let orders = state
        .store
        .list_orders(None, None)
        .await
        .map_err(|err| api_internal("failed to list orders", &err))?;
    let counts = order_counts_by_user(&orders);
    let items = agents
        .into_iter()
        .map(|user| {
            let order_count = counts.get(&user.id).copied().unwrap_or(0);
            AgentSummary { user, order_count }
        })
        .collect();
    Ok(Json(AgentListResponse { items }))
}

#[utoipa::path(
    get,
    path = "/v1/agents/{user_id}",
    tag = "agents",
    params(
        ("user_id" = String, Path, description = "Agent identifier")
    ),
    responses(
        (status = 200, description = "Agent profile", body = User),
        (status = 404, description = "Unknown agent", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_agent(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    require_self_or_admin(&state, &headers, &user_id).await?;
    match state.store.get_user(&user_id).await {
        Ok(user) => Ok(Json(user)),
        Err(StoreError::NotFound(_)) => Err(api_not_found("user not found")),
        Err(err) => Err(api_internal("failed to load user", &err)),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/agents/{user_id}",
    tag = "agents",
    params(
        ("user_id" = String, Path, description = "Agent identifier")
    ),
    request_body = UserPatchRequest,
    responses(
        (status = 200, description = "Updated profile", body = User),
        (status = 400, description = "Immutable field in patch", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown agent", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn patch_agent(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<UserPatchRequest>,
) -> Result<Json<User>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    require_self_or_admin(&state, &headers, &user_id).await?;
    match state.store.update_profile(&user_id, patch).await {
        Ok(user) => Ok(Json(user)),
        Err(StoreError::NotFound(_)) => Err(api_not_found("user not found")),
        Err(StoreError::ImmutableField(field)) => Err(api_immutable_field(&field)),
        Err(err) => Err(api_internal("failed to update profile", &err)),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/agents/{user_id}",
    tag = "agents",
    params(
        ("user_id" = String, Path, description = "Agent identifier")
    ),
    responses(
        (status = 204, description = "Agent and their orders deleted"),
        (status = 404, description = "Unknown agent", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_agent(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    require_self_or_admin(&state, &headers, &user_id).await?;
    match state.store.delete_user(&user_id).await {
        Ok(()) => {
            tracing::info!(%user_id, "agent deleted with order cascade");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(StoreError::NotFound(_)) => Err(api_not_found("user not found")),
        Err(err) => Err(api_internal("failed to delete user", &err)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/agents/{user_id}/orders",
    tag = "agents",
    params(
        ("user_id" = String, Path, description = "Agent identifier")
    ),
    responses(
        (status = 200, description = "The agent's orders, newest first", body = OrderListResponse)
    )
)]
pub(crate) async fn agent_orders(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OrderListResponse>, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    require_self_or_admin(&state, &headers, &user_id).await?;
    let items = state
        .store
        .list_orders(Some(&user_id), None)
        .await
        .map_err(|err| api_internal("failed to list orders", &err))?;
    Ok(Json(OrderListResponse { items }))
}
