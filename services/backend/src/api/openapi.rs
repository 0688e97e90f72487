//! OpenAPI schema aggregation for the backend API.
//!
//! # Purpose
//! Collects all routes and schema types into a single OpenAPI document for
//! docs and client generation.
use crate::analytics::{ActivityEntry, AgentRank, DailyBucket, OrderStats, StatusBreakdown};
use crate::api::{
    agents, analytics, orders, products, stats, system,
    types::{
        AgentListResponse, AgentSummary, AnalyticsResponse, CreateOrderRequest,
        DeletedCountResponse, ErrorResponse, FeatureFlags, HealthStatus, OrderChangesResponse,
        OrderListResponse, OrderSnapshotResponse, ProductListResponse, RegisterAgentRequest,
        SystemInfo,
    },
};
use crate::model::{
    Order, OrderChange, OrderChangeOp, OrderStatus, OrderStatusUpdate, Product, Role, User,
    UserPatchRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "dataflex-backend",
        version = "v1",
        description = "Data-bundle resale backend HTTP API"
    ),
    paths(
        system::system_info,
        system::system_health,
        products::list_products,
        products::get_product,
        agents::register_agent,
        agents::list_agents,
        agents::get_agent,
        agents::patch_agent,
        agents::delete_agent,
        agents::agent_orders,
        orders::create_order,
        orders::list_orders,
        orders::update_order_status,
        orders::clear_orders,
        orders::orders_snapshot,
        orders::order_changes,
        stats::order_stats,
        analytics::analytics_report
    ),
    components(schemas(
        FeatureFlags,
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        Product,
        ProductListResponse,
        Role,
        User,
        UserPatchRequest,
        RegisterAgentRequest,
        AgentSummary,
        AgentListResponse,
        Order,
        OrderStatus,
        OrderStatusUpdate,
        OrderChange,
        OrderChangeOp,
        CreateOrderRequest,
        OrderListResponse,
        OrderSnapshotResponse,
        OrderChangesResponse,
        DeletedCountResponse,
        OrderStats,
        StatusBreakdown,
        AgentRank,
        DailyBucket,
        ActivityEntry,
        AnalyticsResponse
    )),
    tags(
        (name = "system", description = "System and discovery endpoints"),
        (name = "products", description = "Bundle catalog"),
        (name = "agents", description = "Agent directory"),
        (name = "orders", description = "Order placement and lifecycle"),
        (name = "reports", description = "Statistics and analytics")
    )
)]
pub struct ApiDoc;
