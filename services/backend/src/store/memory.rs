//! In-memory implementation of the bundle store.
//!
//! # Purpose
//! This store implements the `BundleStore` trait entirely in memory using
//! `HashMap`s guarded by `tokio::sync::RwLock`. It exists for:
//! - local development and tests (no external dependencies)
//! - demo deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: write locks serialize mutations, and the
//!   lifecycle checks run while the order map is exclusively held, so a
//!   status update can never race another writer.
//! - User deletion holds the users write lock across the order purge, so no
//!   reader ever observes a deleted user with orders still present.
//!
//! # Change feed
//! Order state can be consumed two ways:
//! 1) a full **snapshot** of current orders
//! 2) an incremental **change feed** since a sequence number (`seq`)
//!
//! The feed is a bounded in-memory log (`StoreConfig::change_window`). When
//! the window overflows, old changes are evicted and slow consumers must
//! re-bootstrap via snapshot.
//!
//! # Metrics
//! Updates the same gauges and counters as the durable backend so dashboards
//! do not care which store is configured.
use super::{
    BundleStore, ChangeSet, Snapshot, StoreConfig, StoreError, StoreResult, apply_profile_patch,
};
use crate::lifecycle;
use crate::model::{
    Order, OrderChange, OrderChangeOp, OrderStatus, OrderStatusUpdate, Role, User,
    UserPatchRequest, newest_first,
};
use async_trait::async_trait;
use chrono::Utc;
use dataflex_common::ids::{OrderId, UserId};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Bounded, in-memory append-only log of order changes.
///
/// The log is keyed by a monotonically increasing `seq` assigned by this
/// process. `record()` assigns the next sequence number, appends the change,
/// and evicts the oldest items once the configured capacity is exceeded.
/// Eviction means a consumer may miss changes if it polls too slowly; it must
/// then re-bootstrap via `orders_snapshot()`.
#[derive(Debug)]
struct ChangeLog<T> {
    next_seq: u64,
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> ChangeLog<T> {
    fn new(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    fn record(&mut self, item: impl FnOnce(u64) -> T) -> u64 {
        // Strictly increasing sequence numbers; consumers resume from `since`
        // checkpoints.
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back(item(seq));
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
        seq
    }
}

/// In-memory bundle store.
///
/// Authoritative state lives in `HashMap`s, the change feed in a `ChangeLog`,
/// all wrapped in `Arc<RwLock<...>>` so the store can be cloned into request
/// handlers while reads proceed concurrently.
pub struct InMemoryStore {
    config: StoreConfig,
    /// Authoritative user accounts keyed by user id.
    users: Arc<RwLock<HashMap<UserId, User>>>,
    /// Authoritative orders keyed by order id.
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    /// Bounded change log for the order feed.
    order_changes: Arc<RwLock<ChangeLog<OrderChange>>>,
}

impl InMemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        let capacity = config.change_window();
        Self {
            config,
            users: Arc::new(RwLock::new(HashMap::new())),
            orders: Arc::new(RwLock::new(HashMap::new())),
            order_changes: Arc::new(RwLock::new(ChangeLog::new(capacity))),
        }
    }

    fn limit(&self) -> usize {
        // Max number of changes returned per `order_changes()` call.
        self.config.changes_limit as usize
    }
}

/// Removes every order owned by `user_id`, returned oldest first so that
/// tombstones replay in chronological order.
fn drain_orders_for_user(orders: &mut HashMap<OrderId, Order>, user_id: &UserId) -> Vec<Order> {
    let ids: Vec<OrderId> = orders
        .iter()
        .filter(|(_, order)| order.user_id == *user_id)
        .map(|(id, _)| *id)
        .collect();
    let mut removed: Vec<Order> = ids.into_iter().filter_map(|id| orders.remove(&id)).collect();
    removed.sort_by(|a, b| newest_first(a, b).reverse());
    removed
}

#[async_trait]
impl BundleStore for InMemoryStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Duplicate("email already registered".into()));
        }
        if users.values().any(|u| u.agent_code == user.agent_code) {
            return Err(StoreError::Duplicate("agent code already issued".into()));
        }
        users.insert(user.id, user.clone());
        metrics::gauge!("dataflex_users_total").set(users.len() as f64);
        Ok(user)
    }

    async fn get_user(&self, user_id: &UserId) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("user".into()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_agent_code(&self, agent_code: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.agent_code == agent_code)
            .cloned())
    }

    async fn list_agents(&self) -> StoreResult<Vec<User>> {
        let users = self.users.read().await;
        let mut items: Vec<User> = users
            .values()
            .filter(|u| u.role == Role::Agent)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn update_profile(
        &self,
        user_id: &UserId,
        patch: UserPatchRequest,
    ) -> StoreResult<User> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound("user".into()))?;
        apply_profile_patch(user, patch)?;
        Ok(user.clone())
    }

    async fn delete_user(&self, user_id: &UserId) -> StoreResult<()> {
        // The users write lock is held across the order purge, so no order
        // can be placed for the user mid-cascade and no reader ever sees the
        // user gone with orders still present.
        let mut users = self.users.write().await;
        if !users.contains_key(user_id) {
            return Err(StoreError::NotFound("user".into()));
        }
        // Orders go first, through the same purge path the trait exposes.
        self.delete_orders_for_user(user_id).await?;
        users.remove(user_id);
        metrics::gauge!("dataflex_users_total").set(users.len() as f64);
        Ok(())
    }

    async fn create_order(&self, order: Order) -> StoreResult<Order> {
        // The users lock is held across the insert so a concurrent user
        // delete cannot slip between the ownership check and the write.
        let users = self.users.read().await;
        if !users.contains_key(&order.user_id) {
            return Err(StoreError::NotFound("user".into()));
        }
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate("order exists".into()));
        }
        orders.insert(order.id, order.clone());
        self.order_changes.write().await.record(|seq| OrderChange {
            seq,
            op: OrderChangeOp::Created,
            order_id: order.id,
            order: Some(order.clone()),
        });
        metrics::counter!("dataflex_order_changes_total", "op" => "created").increment(1);
        metrics::gauge!("dataflex_orders_total").set(orders.len() as f64);
        Ok(order)
    }

    async fn list_orders(
        &self,
        user_id: Option<&UserId>,
        status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut items: Vec<Order> = orders
            .values()
            .filter(|order| user_id.map_or(true, |uid| order.user_id == *uid))
            .filter(|order| status.map_or(true, |st| order.status == st))
            .cloned()
            .collect();
        items.sort_by(newest_first);
        Ok(items)
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        update: OrderStatusUpdate,
    ) -> StoreResult<Order> {
        // Lookup, precondition, lifecycle check, and write all happen under
        // one write lock; two racing updates serialize and the loser sees the
        // winner's status.
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound("order".into()))?;
        if let Some(expected) = update.expected_status {
            if order.status != expected {
                return Err(StoreError::ConcurrencyConflict(format!(
                    "order is {}, expected {expected}",
                    order.status
                )));
            }
        }
        if !lifecycle::can_transition(order.status, update.status) {
            return Err(StoreError::InvalidTransition {
                from: order.status,
                to: update.status,
            });
        }
        order.status = update.status;
        if let Some(note) = lifecycle::transition_note(update.status, update.processing_note) {
            order.processing_note = Some(note);
        }
        order.updated_at = Utc::now();
        let updated = order.clone();
        self.order_changes.write().await.record(|seq| OrderChange {
            seq,
            op: OrderChangeOp::Updated,
            order_id: updated.id,
            order: Some(updated.clone()),
        });
        metrics::counter!("dataflex_order_changes_total", "op" => "updated").increment(1);
        metrics::counter!("dataflex_order_transitions_total", "to" => updated.status.as_str())
            .increment(1);
        Ok(updated)
    }

    async fn delete_all_orders(&self) -> StoreResult<u64> {
        let mut orders = self.orders.write().await;
        let mut removed: Vec<Order> = orders.drain().map(|(_, order)| order).collect();
        removed.sort_by(|a, b| newest_first(a, b).reverse());
        let mut changes = self.order_changes.write().await;
        for order in &removed {
            changes.record(|seq| OrderChange {
                seq,
                op: OrderChangeOp::Deleted,
                order_id: order.id,
                order: Some(order.clone()),
            });
        }
        drop(changes);
        metrics::counter!("dataflex_order_changes_total", "op" => "deleted")
            .increment(removed.len() as u64);
        metrics::gauge!("dataflex_orders_total").set(orders.len() as f64);
        Ok(removed.len() as u64)
    }

    async fn delete_orders_for_user(&self, user_id: &UserId) -> StoreResult<u64> {
        let mut orders = self.orders.write().await;
        let removed = drain_orders_for_user(&mut orders, user_id);
        let mut changes = self.order_changes.write().await;
        for order in &removed {
            changes.record(|seq| OrderChange {
                seq,
                op: OrderChangeOp::Deleted,
                order_id: order.id,
                order: Some(order.clone()),
            });
        }
        drop(changes);
        metrics::counter!("dataflex_order_changes_total", "op" => "deleted")
            .increment(removed.len() as u64);
        metrics::gauge!("dataflex_orders_total").set(orders.len() as f64);
        Ok(removed.len() as u64)
    }

    async fn orders_snapshot(&self) -> StoreResult<Snapshot<Order>> {
        // `next_seq` is the checkpoint a consumer passes as `since` on its
        // first changes poll.
        let mut items: Vec<Order> = self.orders.read().await.values().cloned().collect();
        items.sort_by(newest_first);
        let next_seq = self.order_changes.read().await.next_seq;
        Ok(Snapshot { items, next_seq })
    }

    async fn order_changes(&self, since: u64) -> StoreResult<ChangeSet<OrderChange>> {
        // Filter by `seq >= since` (inclusive) with a page limit. A caller
        // whose `since` predates the retained window receives partial history
        // and should re-bootstrap from a snapshot.
        let guard = self.order_changes.read().await;
        let items: Vec<OrderChange> = guard
            .items
            .iter()
            .filter(|item| item.seq >= since)
            .take(self.limit())
            .cloned()
            .collect();
        // A full page may have been cut short of the head; point the cursor
        // at the first unreturned change so a resuming caller skips nothing.
        let next_seq = if items.len() == self.limit() {
            items.last().map_or(guard.next_seq, |item| item.seq + 1)
        } else {
            guard.next_seq
        };
        Ok(ChangeSet { items, next_seq })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
