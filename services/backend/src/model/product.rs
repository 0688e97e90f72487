//! Product model definition.
//!
//! # Purpose
//! Defines catalog entries for sellable data bundles. Products are loaded once
//! at startup and never mutated; orders copy the fields they need at creation.
use dataflex_common::ids::ProductId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Product {
    #[schema(value_type = String)]
    pub id: ProductId,
    pub name: String,
    /// Network provider grouping shown in the storefront ("MTN Data Bundles").
    pub category: String,
    /// Unit price in GHS.
    #[schema(value_type = String)]
    pub price: Decimal,
    pub description: String,
    pub short_description: String,
}
