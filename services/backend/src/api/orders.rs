//! Order API handlers.
//!
//! # Purpose
//! Order placement, admin listing and lifecycle transitions, the bulk clear
//! maintenance action, and the snapshot/changes feed the storefront polls.
//!
//! # Scoping
//! Snapshot and changes are served to admins in full; an agent credential
//! sees only its own orders and change entries.
use crate::api::error::{
    ApiError, api_concurrency_conflict, api_internal, api_invalid_transition, api_not_found,
    api_validation_error,
};
use crate::api::types::{
    CreateOrderRequest, DeletedCountResponse, OrderChangesResponse, OrderListResponse,
    OrderSnapshotResponse,
};
use crate::api::{parse_query_param, resolve_product};
use crate::app::AppState;
use crate::auth::{Identity, require_admin, require_identity};
use crate::model::{Order, OrderStatus, OrderStatusUpdate, Role};
use crate::store::StoreError;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use dataflex_common::ids::OrderId;
use std::collections::HashMap;
use std::str::FromStr;

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    OrderId::from_str(raw).map_err(|_| api_validation_error("order id must be a UUID"))
}

#[utoipa::path(
    post,
    path = "/v1/orders",
    tag = "orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = Order),
        (status = 404, description = "Unknown product", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = require_identity(&state, &headers).await?;
    let product = resolve_product(&state, &body.product_id)?;
    // Name and price are snapshots taken server-side at placement; the client
    // only names the product.
    let owner = match state.store.get_user(&identity.user_id).await {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => return Err(api_not_found("user not found")),
        Err(err) => return Err(api_internal("failed to load user", &err)),
    };
    let now = Utc::now();
    let order = Order {
        id: OrderId::new(),
        product_id: product.id.clone(),
        product_name: product.name.clone(),
        user_id: owner.id,
        user_name: owner.name.clone(),
        price: product.price,
        status: OrderStatus::Pending,
        processing_note: None,
        created_at: now,
        updated_at: now,
    };
    match state.store.create_order(order).await {
        Ok(order) => {
            tracing::info!(order_id = %order.id, user_id = %order.user_id, "order placed");
            Ok((StatusCode::CREATED, Json(order)))
        }
        Err(StoreError::NotFound(_)) => Err(api_not_found("user not found")),
        Err(err) => Err(api_internal("failed to create order", &err)),
    }
}

#[utoipa::path(
    get,
    path = "/v1/orders",
    tag = "orders",
    params(
        ("status" = Option<String>, Query, description = "Filter by order status")
    ),
    responses(
        (status = 200, description = "All orders, newest first", body = OrderListResponse),
        (status = 403, description = "Admin role required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_orders(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OrderListResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    let status: Option<OrderStatus> = parse_query_param(&params, "status")?;
    let items = state
        .store
        .list_orders(None, status)
        .await
        .map_err(|err| api_internal("failed to list orders", &err))?;
    Ok(Json(OrderListResponse { items }))
}

#[utoipa::path(
    patch,
    path = "/v1/orders/{order_id}/status",
    tag = "orders",
    params(
        ("order_id" = String, Path, description = "Order identifier")
    ),
    request_body = OrderStatusUpdate,
    responses(
        (status = 200, description = "Order after the transition", body = Order),
        (status = 404, description = "Unknown order", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Illegal transition or stale precondition", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_order_status(
    Path(order_id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<OrderStatusUpdate>,
) -> Result<Json<Order>, ApiError> {
    require_admin(&state, &headers).await?;
    let order_id = parse_order_id(&order_id)?;
    match state.store.update_order_status(&order_id, update).await {
        Ok(order) => {
            tracing::info!(%order_id, status = %order.status, "order transitioned");
            Ok(Json(order))
        }
        Err(StoreError::NotFound(_)) => Err(api_not_found("order not found")),
        Err(StoreError::InvalidTransition { from, to }) => Err(api_invalid_transition(from, to)),
        Err(StoreError::ConcurrencyConflict(message)) => Err(api_concurrency_conflict(&message)),
        Err(err) => Err(api_internal("failed to update order status", &err)),
    }
}

#[utoipa::path(
    delete,
    path = "/v1/orders",
    tag = "orders",
    responses(
        (status = 200, description = "Count of orders removed", body = DeletedCountResponse),
        (status = 403, description = "Admin role required", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn clear_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DeletedCountResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    let deleted = state
        .store
        .delete_all_orders()
        .await
        .map_err(|err| api_internal("failed to clear orders", &err))?;
    tracing::info!(deleted, "all orders cleared");
    Ok(Json(DeletedCountResponse { deleted }))
}

#[utoipa::path(
    get,
    path = "/v1/orders/snapshot",
    tag = "orders",
    responses(
        (status = 200, description = "Orders plus the change-feed checkpoint", body = OrderSnapshotResponse)
    )
)]
pub(crate) async fn orders_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OrderSnapshotResponse>, ApiError> {
    let identity = require_identity(&state, &headers).await?;
    let snapshot = state
        .store
        .orders_snapshot()
        .await
        .map_err(|err| api_internal("failed to load order snapshot", &err))?;
    let items = scope_orders(snapshot.items, &identity);
    Ok(Json(OrderSnapshotResponse {
        items,
        next_seq: snapshot.next_seq,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/orders/changes",
    tag = "orders",
    params(
        ("since" = Option<u64>, Query, description = "Last seen sequence")
    ),
    responses(
        (status = 200, description = "Order change page", body = OrderChangesResponse)
    )
)]
pub(crate) async fn order_changes(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OrderChangesResponse>, ApiError> {
    let identity = require_identity(&state, &headers).await?;
    let since = parse_query_param::<u64>(&params, "since")?.unwrap_or(0);
    let changes = state
        .store
        .order_changes(since)
        .await
        .map_err(|err| api_internal("failed to load order changes", &err))?;
    let items = match identity.role {
        Role::Admin => changes.items,
        // Agents see only entries for their own orders. Tombstones carry the
        // final order state, so ownership is always recoverable.
        Role::Agent => changes
            .items
            .into_iter()
            .filter(|change| {
                change
                    .order
                    .as_ref()
                    .is_some_and(|order| order.user_id == identity.user_id)
            })
            .collect(),
    };
    Ok(Json(OrderChangesResponse {
        items,
        next_seq: changes.next_seq,
    }))
}

fn scope_orders(items: Vec<Order>, identity: &Identity) -> Vec<Order> {
    match identity.role {
        Role::Admin => items,
        Role::Agent => items
            .into_iter()
            .filter(|order| order.user_id == identity.user_id)
            .collect(),
    }
}
