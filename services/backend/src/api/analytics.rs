//! Admin analytics handler.
//!
//! # Purpose
//! Serves the full aggregator output for the admin dashboard in one round
//! trip. All figures come from a single snapshot read, so the sections agree
//! with each other even while orders are being written.
use crate::analytics::{
    RECENT_ACTIVITY_LIMIT, daily_orders, orders_by_status, recent_activity, summarize,
    top_agents,
};
use crate::api::error::{ApiError, api_internal};
use crate::api::parse_query_param;
use crate::api::types::AnalyticsResponse;
use crate::app::AppState;
use crate::auth::require_admin;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use chrono::Utc;
use std::collections::HashMap;

/// Agents shown on the dashboard leaderboard unless the caller asks for more.
const DEFAULT_TOP_AGENTS: usize = 5;

#[utoipa::path(
    get,
    path = "/v1/analytics",
    tag = "reports",
    params(
        ("limit" = Option<usize>, Query, description = "Leaderboard length, default 5")
    ),
    responses(
        (status = 200, description = "Full analytics report", body = AnalyticsResponse),
        (status = 403, description = "Admin role required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn analytics_report(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    let limit = parse_query_param::<usize>(&params, "limit")?.unwrap_or(DEFAULT_TOP_AGENTS);
    let orders = state
        .store
        .list_orders(None, None)
        .await
        .map_err(|err| api_internal("failed to list orders", &err))?;
    let agents = state
        .store
        .list_agents()
        .await
        .map_err(|err| api_internal("failed to list agents", &err))?;
    let mut ranked = top_agents(&orders, &agents);
    ranked.truncate(limit);
    Ok(Json(AnalyticsResponse {
        summary: summarize(&orders),
        by_status: orders_by_status(&orders),
        top_agents: ranked,
        daily_orders: daily_orders(&orders, Utc::now().date_naive()),
        recent_activity: recent_activity(&orders, RECENT_ACTIVITY_LIMIT),
    }))
}
