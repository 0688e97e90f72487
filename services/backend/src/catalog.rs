//! Product catalog.
//!
//! # Purpose
//! Loads the sellable bundle list and answers id lookups. The catalog is
//! read-only for the lifetime of the process.
//!
//! # How products are sourced
//! The default list is a CSV compiled into the binary. Operators can point
//! `DATAFLEX_CATALOG_CSV` at their own file to replace it without a rebuild.
//! Malformed rows are skipped with a warning rather than failing startup; if
//! nothing at all parses, a small built-in list keeps the storefront usable.
use crate::model::Product;
use dataflex_common::ids::ProductId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

const EMBEDDED_CSV: &str = include_str!("../data/products.csv");

const EXPECTED_COLUMNS: usize = 6;

/// Immutable product list with id lookup.
pub struct Catalog {
    products: Vec<Product>,
    by_id: HashMap<ProductId, usize>,
}

impl Catalog {
    /// Loads the catalog, preferring `csv_path` when given.
    ///
    /// Never fails: an unreadable or empty override falls back to the
    /// embedded list, and an empty embedded list falls back to
    /// [`fallback_products`].
    pub fn load(csv_path: Option<&Path>) -> Self {
        if let Some(path) = csv_path {
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let products = parse_csv(&text);
                    if products.is_empty() {
                        tracing::warn!(
                            path = %path.display(),
                            "catalog override contained no usable rows, using embedded list"
                        );
                    } else {
                        tracing::info!(
                            path = %path.display(),
                            products = products.len(),
                            "loaded catalog override"
                        );
                        return Self::from_products(products);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to read catalog override, using embedded list"
                    );
                }
            }
        }
        let mut products = parse_csv(EMBEDDED_CSV);
        if products.is_empty() {
            products = fallback_products();
        }
        Self::from_products(products)
    }

    fn from_products(products: Vec<Product>) -> Self {
        let by_id = products
            .iter()
            .enumerate()
            .map(|(idx, product)| (product.id.clone(), idx))
            .collect();
        Self { products, by_id }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn get(&self, id: &ProductId) -> Option<&Product> {
        self.by_id.get(id).map(|idx| &self.products[*idx])
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Parses catalog CSV text, skipping the header row and any row that does not
/// yield a valid product.
fn parse_csv(text: &str) -> Vec<Product> {
    let mut products = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line_no == 0 || line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(product) => products.push(product),
            None => {
                tracing::warn!(line = line_no + 1, "skipping malformed catalog row");
            }
        }
    }
    products
}

fn parse_row(line: &str) -> Option<Product> {
    let fields = split_csv_line(line);
    if fields.len() != EXPECTED_COLUMNS {
        return None;
    }
    let id = ProductId::from_str(&fields[0]).ok()?;
    let name = fields[1].trim();
    let category = fields[2].trim();
    let price = Decimal::from_str(fields[3].trim()).ok()?;
    if name.is_empty() || category.is_empty() || price < Decimal::ZERO {
        return None;
    }
    Some(Product {
        id,
        name: name.to_string(),
        category: category.to_string(),
        price,
        description: fields[4].trim().to_string(),
        short_description: fields[5].trim().to_string(),
    })
}

/// Splits one CSV line into fields. Double quotes wrap fields containing
/// commas; a doubled quote inside a quoted field is a literal quote.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Minimal list used when no CSV source yields any products.
fn fallback_products() -> Vec<Product> {
    let payment = "After checkout, pay to 0551999901 via Mobile Money and send \
                   proof of payment on WhatsApp.";
    [
        ("mtn-1gb", "MTN - 1GB", "MTN Data Bundles", "6.00"),
        ("vodafone-2gb", "Vodafone - 2GB", "Vodafone Data Bundles", "10.00"),
    ]
    .into_iter()
    .filter_map(|(id, name, category, price)| {
        Some(Product {
            id: ProductId::from_str(id).ok()?,
            name: name.to_string(),
            category: category.to_string(),
            price: Decimal::from_str(price).ok()?,
            description: format!("{name} data bundle. {payment}"),
            short_description: "Manual delivery after payment confirmation.".to_string(),
        })
    })
    .collect()
}
