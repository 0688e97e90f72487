//! Backend service library crate.
//!
//! # Purpose
//! Exposes the HTTP API surface, domain model, lifecycle and analytics
//! logic, configuration, and storage implementations for use by the binary
//! and the integration tests.
//!
//! # Notes
//! Module boundaries mirror the HTTP API and storage backends for clarity.
pub mod analytics;
pub mod api;
pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod lifecycle;
pub mod model;
pub mod observability;
pub mod store;
