//! Backend HTTP application wiring.
//!
//! # Purpose
//! Builds the axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! This module centralizes route composition to keep `main` small and
//! testable; the integration suite drives `build_router` directly.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::api::types::FeatureFlags;
use crate::catalog::Catalog;
use crate::observability;
use crate::store::BundleStore;
use axum::Router;
use dataflex_common::ids::UserId;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub api_version: String,
    pub features: FeatureFlags,
    pub store: Arc<dyn BundleStore + Send + Sync>,
    pub catalog: Arc<Catalog>,
    /// Bearer credential that resolves to the seeded admin. `None` disables
    /// every admin-only route.
    pub admin_token: Option<String>,
    pub admin_user_id: UserId,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/v1/system/info",
            axum::routing::get(api::system::system_info),
        )
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route(
            "/v1/products",
            axum::routing::get(api::products::list_products),
        )
        .route(
            "/v1/products/:product_id",
            axum::routing::get(api::products::get_product),
        )
        .route(
            "/v1/agents",
            axum::routing::get(api::agents::list_agents).post(api::agents::register_agent),
        )
        .route(
            "/v1/agents/:user_id",
            axum::routing::get(api::agents::get_agent)
                .patch(api::agents::patch_agent)
                .delete(api::agents::delete_agent),
        )
        .route(
            "/v1/agents/:user_id/orders",
            axum::routing::get(api::agents::agent_orders),
        )
        .route(
            "/v1/orders/snapshot",
            axum::routing::get(api::orders::orders_snapshot),
        )
        .route(
            "/v1/orders/changes",
            axum::routing::get(api::orders::order_changes),
        )
        .route(
            "/v1/orders",
            axum::routing::get(api::orders::list_orders)
                .post(api::orders::create_order)
                .delete(api::orders::clear_orders),
        )
        .route(
            "/v1/orders/:order_id/status",
            axum::routing::patch(api::orders::update_order_status),
        )
        .route("/v1/stats", axum::routing::get(api::stats::order_stats))
        .route(
            "/v1/analytics",
            axum::routing::get(api::analytics::analytics_report),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
