//! Backend HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules and shared helpers for resolving catalog
//! products and parsing common query parameters.
pub mod agents;
pub mod analytics;
pub mod error;
pub mod openapi;
pub mod orders;
pub mod products;
pub mod stats;
pub mod system;
pub mod types;

use crate::api::error::{ApiError, api_not_found, api_validation_error};
use crate::app::AppState;
use crate::model::Product;
use dataflex_common::ids::ProductId;
use std::collections::HashMap;
use std::str::FromStr;

/// Resolve a raw product id into a catalog entry.
///
/// A malformed slug is a validation error; a well-formed slug with no catalog
/// entry is a 404.
pub(crate) fn resolve_product(state: &AppState, raw_id: &str) -> Result<Product, ApiError> {
    let product_id = ProductId::from_str(raw_id)
        .map_err(|_| api_validation_error("product id must be a lowercase slug"))?;
    state
        .catalog
        .get(&product_id)
        .cloned()
        .ok_or_else(|| api_not_found("product not found"))
}

/// Parse an optional typed query parameter, rejecting unparseable values.
pub(crate) fn parse_query_param<T: FromStr>(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, ApiError> {
    match params.get(key) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| api_validation_error(&format!("invalid {key} parameter"))),
    }
}
