//! Order statistics handler.
//!
//! # Purpose
//! Serves the counts-and-revenue summary behind both dashboards. Admins see
//! store-wide figures (optionally scoped to one agent via `user_id`); an
//! agent credential is always scoped to its own orders.
use crate::analytics::{OrderStats, summarize};
use crate::api::error::{ApiError, api_internal};
use crate::api::parse_query_param;
use crate::app::AppState;
use crate::auth::require_identity;
use crate::model::Role;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use dataflex_common::ids::UserId;
use std::collections::HashMap;

#[utoipa::path(
    get,
    path = "/v1/stats",
    tag = "reports",
    params(
        ("user_id" = Option<String>, Query, description = "Scope to one agent (admin only)")
    ),
    responses(
        (status = 200, description = "Order counts and revenue", body = OrderStats)
    )
)]
pub(crate) async fn order_stats(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OrderStats>, ApiError> {
    let identity = require_identity(&state, &headers).await?;
    let scope = match identity.role {
        Role::Agent => Some(identity.user_id),
        Role::Admin => parse_query_param::<UserId>(&params, "user_id")?,
    };
    let orders = state
        .store
        .list_orders(scope.as_ref(), None)
        .await
        .map_err(|err| api_internal("failed to list orders", &err))?;
    Ok(Json(summarize(&orders)))
}
