//! Product catalog API handlers.
//!
//! # Purpose
//! Serves the read-only bundle catalog. No guard: the storefront shows
//! products to anonymous visitors.
use crate::api::error::ApiError;
use crate::api::resolve_product;
use crate::api::types::ProductListResponse;
use crate::app::AppState;
use crate::model::Product;
use axum::Json;
use axum::extract::{Path, State};

#[utoipa::path(
    get,
    path = "/v1/products",
    tag = "products",
    responses(
        (status = 200, description = "List sellable bundles", body = ProductListResponse)
    )
)]
pub(crate) async fn list_products(State(state): State<AppState>) -> Json<ProductListResponse> {
    Json(ProductListResponse {
        items: state.catalog.products().to_vec(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/products/{product_id}",
    tag = "products",
    params(
        ("product_id" = String, Path, description = "Catalog slug, e.g. mtn-1gb")
    ),
    responses(
        (status = 200, description = "Catalog entry", body = Product),
        (status = 404, description = "Unknown product", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_product(
    Path(product_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Product>, ApiError> {
    let product = resolve_product(&state, &product_id)?;
    Ok(Json(product))
}
