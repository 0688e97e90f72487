//! Storage abstraction for users and orders.
//!
//! # Purpose
//! Defines the [`BundleStore`] trait the API handlers depend on, the error
//! kinds stores report, and the shared profile patch rules. Two backends
//! implement the trait: an in-memory store for development and tests, and a
//! Postgres store for durable deployments.
use crate::model::{Order, OrderChange, OrderStatus, OrderStatusUpdate, User, UserPatchRequest};
use async_trait::async_trait;
use chrono::Utc;
use dataflex_common::ids::{OrderId, UserId};
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum change entries returned per `order_changes` call.
    pub changes_limit: u64,
    /// Change rows retained before pruning. `None` keeps the default window.
    pub change_retention_max_rows: Option<i64>,
}

impl StoreConfig {
    pub fn change_window(&self) -> usize {
        self.change_retention_max_rows
            .unwrap_or(self.changes_limit as i64)
            .max(self.changes_limit as i64) as usize
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub items: Vec<T>,
    pub next_seq: u64,
}

/// One page of the change feed. `next_seq` is the cursor for the next poll:
/// the head of the log when the page reached it, otherwise the first
/// sequence the page did not return.
#[derive(Debug, Clone)]
pub struct ChangeSet<T> {
    pub items: Vec<T>,
    pub next_seq: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("immutable field: {0}")]
    ImmutableField(String),
    #[error("conflict: {0}")]
    ConcurrencyConflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn create_user(&self, user: User) -> StoreResult<User>;
    async fn get_user(&self, user_id: &UserId) -> StoreResult<User>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_agent_code(&self, agent_code: &str) -> StoreResult<Option<User>>;
    async fn list_agents(&self) -> StoreResult<Vec<User>>;
    async fn update_profile(&self, user_id: &UserId, patch: UserPatchRequest)
    -> StoreResult<User>;
    /// Removes the user and every order they own in one atomic step.
    async fn delete_user(&self, user_id: &UserId) -> StoreResult<()>;

    /// Persists an order after checking its owner still exists.
    async fn create_order(&self, order: Order) -> StoreResult<Order>;
    async fn list_orders(
        &self,
        user_id: Option<&UserId>,
        status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>>;
    /// Applies a status transition under the lifecycle rules, atomically with
    /// its change-log entry.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        update: OrderStatusUpdate,
    ) -> StoreResult<Order>;
    async fn delete_all_orders(&self) -> StoreResult<u64>;
    /// Removes one user's orders with tombstones; `delete_user` cascades
    /// through this same path.
    async fn delete_orders_for_user(&self, user_id: &UserId) -> StoreResult<u64>;
    async fn orders_snapshot(&self) -> StoreResult<Snapshot<Order>>;
    async fn order_changes(&self, since: u64) -> StoreResult<ChangeSet<OrderChange>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Applies a profile patch in place, enforcing the immutable fields.
///
/// `email`, `role`, and `agent_code` may be echoed back unchanged but never
/// altered. An empty `phone` clears the stored number. Both backends call
/// through here so the rules cannot drift.
pub(crate) fn apply_profile_patch(user: &mut User, patch: UserPatchRequest) -> StoreResult<()> {
    if let Some(email) = &patch.email {
        if !email.trim().eq_ignore_ascii_case(&user.email) {
            return Err(StoreError::ImmutableField("email".to_string()));
        }
    }
    if let Some(role) = patch.role {
        if role != user.role {
            return Err(StoreError::ImmutableField("role".to_string()));
        }
    }
    if let Some(code) = &patch.agent_code {
        if code.trim() != user.agent_code {
            return Err(StoreError::ImmutableField("agent_code".to_string()));
        }
    }
    if let Some(name) = patch.name {
        user.name = name.trim().to_string();
    }
    if let Some(phone) = patch.phone {
        let phone = phone.trim().to_string();
        user.phone = if phone.is_empty() { None } else { Some(phone) };
    }
    user.updated_at = Utc::now();
    Ok(())
}
