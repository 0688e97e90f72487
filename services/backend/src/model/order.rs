//! Order model definitions, the status enum, and change-log payloads.
//!
//! # Purpose
//! Defines order records as stored and served, the status-update payload
//! accepted by the API, and the change events emitted by the order change
//! feed.
use chrono::{DateTime, Utc};
use dataflex_common::ids::{OrderId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle state of an order.
///
/// `Completed` and `Cancelled` are terminal; the lifecycle rules reject every
/// transition out of them, including repeats of the same status.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Every status, in the order reports present them.
    pub const ALL: [OrderStatus; 4] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// An order for a single data bundle.
///
/// Product name and price are copied out of the catalog when the order is
/// placed, so later catalog edits never rewrite order history.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Order {
    #[schema(value_type = String)]
    pub id: OrderId,
    #[schema(value_type = String)]
    pub product_id: ProductId,
    pub product_name: String,
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub user_name: String,
    /// Price in GHS at the time the order was placed.
    #[schema(value_type = String)]
    pub price: Decimal,
    pub status: OrderStatus,
    /// Free-text note recorded alongside status transitions.
    pub processing_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stable listing order used everywhere orders are served: newest first, with
/// ties broken by id so equal timestamps still list deterministically.
pub fn newest_first(a: &Order, b: &Order) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Payload for the status-update endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderStatusUpdate {
    pub status: OrderStatus,
    pub processing_note: Option<String>,
    /// Optional precondition; the update is rejected with a conflict when the
    /// stored status no longer matches.
    pub expected_status: Option<OrderStatus>,
}

/// Kind of change recorded in the order change feed.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OrderChangeOp {
    Created,
    Updated,
    Deleted,
}

/// One entry in the order change feed.
///
/// `order` carries the record as of the change; deletions keep the final
/// state so pollers can tell whose order vanished.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderChange {
    pub seq: u64,
    pub op: OrderChangeOp,
    #[schema(value_type = String)]
    pub order_id: OrderId,
    pub order: Option<Order>,
}
