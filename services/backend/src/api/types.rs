//! HTTP API request/response types.
//!
//! # Purpose
//! Defines shared payload shapes for the backend REST API and OpenAPI schema
//! generation.
use crate::analytics::{ActivityEntry, AgentRank, DailyBucket, OrderStats, StatusBreakdown};
use crate::model::{Order, OrderChange, Product, User};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct FeatureFlags {
    pub durable_storage: bool,
    pub order_change_feed: bool,
    pub analytics: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub features: FeatureFlags,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ProductListResponse {
    pub items: Vec<Product>,
}

/// Public registration payload. Role and agent code are assigned server-side.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// An agent as listed for admins, annotated with their order count.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AgentSummary {
    pub user: User,
    pub order_count: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AgentListResponse {
    pub items: Vec<AgentSummary>,
}

/// Order placement payload. Name and price are copied from the catalog, and
/// the owner is taken from the bearer credential.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CreateOrderRequest {
    pub product_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderListResponse {
    pub items: Vec<Order>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderSnapshotResponse {
    pub items: Vec<Order>,
    pub next_seq: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderChangesResponse {
    pub items: Vec<OrderChange>,
    pub next_seq: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct DeletedCountResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AnalyticsResponse {
    pub summary: OrderStats,
    pub by_status: Vec<StatusBreakdown>,
    pub top_agents: Vec<AgentRank>,
    pub daily_orders: Vec<DailyBucket>,
    pub recent_activity: Vec<ActivityEntry>,
}
