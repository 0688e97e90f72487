//! Postgres implementation of the bundle store.
//!
//! # Purpose
//! Durable backend for user accounts, orders, and the order change log.
//! Postgres is the authoritative store; every mutation that touches the
//! change feed couples the authoritative write and the change-log insert in
//! one transaction, so watchers never see a row without its change or a
//! change without its row.
//!
//! # Schema mapping
//! Row structs (`DbUser`, `DbOrder`, ...) mirror the SQL schema and are kept
//! separate from the domain types so parsing happens in one place and schema
//! evolution stays localized. Enum-ish columns (`role`, `status`, `op`) are
//! stored as text and parsed on read.
//!
//! # Change feed
//! `order_changes.seq` is assigned by Postgres (BIGSERIAL) and is strictly
//! increasing. Consumers poll `WHERE seq >= since` with a page limit, and the
//! retention task bounds the table to the most recent rows; a consumer that
//! falls behind the window must re-bootstrap from a snapshot.
//!
//! # Cascades
//! Deleting a user removes their orders and the user in the same
//! transaction, orders first, and records one tombstone per removed order so
//! pollers can evict them.
use super::{
    BundleStore, ChangeSet, Snapshot, StoreConfig, StoreError, StoreResult, apply_profile_patch,
};
use crate::config::PostgresConfig;
use crate::lifecycle;
use crate::model::{
    Order, OrderChange, OrderChangeOp, OrderStatus, OrderStatusUpdate, Role, User,
    UserPatchRequest,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dataflex_common::ids::{OrderId, ProductId, UserId};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

#[cfg(feature = "pg-tests")]
const RETENTION_TICK: Duration = Duration::from_secs(1);
#[cfg(not(feature = "pg-tests"))]
const RETENTION_TICK: Duration = Duration::from_secs(60);

/// Durable bundle store backed by Postgres.
///
/// # What it does
/// Implements [`BundleStore`] with Postgres as the authoritative store and
/// change-log backend.
///
/// # Errors
/// - Connection and query failures surface as [`StoreError`].
///
/// # Security notes
/// - Database URLs may include credentials; avoid logging them.
///
/// # Example
/// ```rust,no_run
/// use dataflex_backend::config::PostgresConfig;
/// use dataflex_backend::store::{StoreConfig, postgres::PostgresStore};
///
/// async fn open(pg: PostgresConfig, cfg: StoreConfig) {
///     let _ = PostgresStore::connect(&pg, cfg).await;
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
    config: StoreConfig,
}

/// Row shape for the `users` table.
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    phone: Option<String>,
    agent_code: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row shape for the `orders` table.
#[derive(Debug, Clone, FromRow)]
struct DbOrder {
    id: Uuid,
    product_id: String,
    product_name: String,
    user_id: Uuid,
    user_name: String,
    price: Decimal,
    status: String,
    processing_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row shape for the `order_changes` table.
///
/// `payload` holds the order as of the change; deletions keep the final state
/// so pollers can tell whose order vanished.
#[derive(Debug, Clone, FromRow)]
struct OrderChangeRow {
    seq: i64,
    op: String,
    order_id: Uuid,
    payload: Option<Value>,
}

impl PostgresStore {
    /// Connect to Postgres, run migrations, and start retention maintenance.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    ///
    /// # Example
    /// ```rust,no_run
    /// use dataflex_backend::config::PostgresConfig;
    /// use dataflex_backend::store::{StoreConfig, postgres::PostgresStore};
    ///
    /// async fn open(pg: PostgresConfig, cfg: StoreConfig) {
    ///     let _ = PostgresStore::connect(&pg, cfg).await;
    /// }
    /// ```
    pub async fn connect(pg: &PostgresConfig, config: StoreConfig) -> StoreResult<Self> {
        // Pool tuning: `max_connections` caps concurrent DB work and
        // `acquire_timeout` bounds how long a request waits for a pooled
        // connection before failing fast. Avoid logging `pg.url` because it
        // may contain credentials.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await?;

        // Migrations run before serving requests so handlers can assume the
        // schema exists. A migration failure fails startup.
        sqlx::migrate!("./migrations").run(&pool).await?;

        // Optional change-log retention bounds the append-only table.
        if let Some(retention) = config.change_retention_max_rows {
            spawn_retention_task(pool.clone(), retention);
        }

        Ok(Self { pool, config })
    }

    /// Page size limit for change queries.
    fn limit(&self) -> i64 {
        self.config.changes_limit as i64
    }

    /// Checkpoint for snapshot consumers: the seq the next change will take.
    async fn next_change_seq(&self) -> StoreResult<u64> {
        let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq) + 1, 0) FROM order_changes")
            .fetch_one(&self.pool)
            .await?;
        Ok(next as u64)
    }

    /// Refresh the user and order gauges so dashboards track this backend the
    /// same way they track the in-memory one.
    async fn refresh_counts(&self) {
        if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
        {
            metrics::gauge!("dataflex_users_total").set(count as f64);
        }
        if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
        {
            metrics::gauge!("dataflex_orders_total").set(count as f64);
        }
    }
}

/// Spawn a best-effort background task that bounds the change table to the
/// most recent `max_rows` entries.
///
/// Every tick it computes a cutoff (`MAX(seq) - max_rows + 1`) and deletes
/// rows below it; `COALESCE(..., 0)` makes the delete a no-op on an empty
/// table. Transient DB errors are ignored and retried next tick. This is
/// last-N retention, not time-based: a client that falls behind the window
/// must re-bootstrap from a snapshot.
fn spawn_retention_task(pool: PgPool, max_rows: i64) {
    // The table name comes from a hard-coded allowlist. Do NOT pass user
    // input into this format string.
    let tables = ["order_changes"];
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETENTION_TICK);
        loop {
            ticker.tick().await;
            for table in tables {
                let query = format!(
                    "DELETE FROM {table} WHERE seq < (SELECT COALESCE(MAX(seq) - $1 + 1, 0) FROM {table})"
                );
                let _ = sqlx::query(&query).bind(max_rows).execute(&pool).await;
            }
        }
    });
}

/// Append one change-log entry inside the caller's transaction.
async fn insert_order_change(
    tx: &mut Transaction<'_, Postgres>,
    op: &str,
    order: &Order,
) -> StoreResult<()> {
    sqlx::query(r#"INSERT INTO order_changes (op, order_id, payload) VALUES ($1, $2, $3)"#)
        .bind(op)
        .bind(order.id.as_uuid())
        .bind(serde_json::to_value(order).ok())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Remove every order owned by `user_id` inside the caller's transaction,
/// oldest first, recording one tombstone per removed order. Both the
/// standalone purge and the user-deletion cascade go through here.
async fn purge_user_orders(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &UserId,
) -> StoreResult<Vec<Order>> {
    let rows = sqlx::query_as::<_, DbOrder>(
        r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                  processing_note, created_at, updated_at
           FROM orders WHERE user_id = $1
           ORDER BY created_at ASC, id ASC"#,
    )
    .bind(user_id.as_uuid())
    .fetch_all(&mut **tx)
    .await?;
    sqlx::query("DELETE FROM orders WHERE user_id = $1")
        .bind(user_id.as_uuid())
        .execute(&mut **tx)
        .await?;
    let mut removed = Vec::with_capacity(rows.len());
    for row in rows {
        removed.push(order_from_db(row)?);
    }
    for order in &removed {
        insert_order_change(tx, "Deleted", order).await?;
    }
    Ok(removed)
}

#[async_trait]
impl BundleStore for PostgresStore {
    async fn create_user(&self, user: User) -> StoreResult<User> {
        let insert = sqlx::query(
            r#"INSERT INTO users (id, name, email, role, phone, agent_code, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(&user.agent_code)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Duplicate("user exists".into()));
            }
            return Err(StoreError::Unexpected(err.into()));
        }
        self.refresh_counts().await;
        Ok(user)
    }

    async fn get_user(&self, user_id: &UserId) -> StoreResult<User> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, name, email, role, phone, agent_code, created_at, updated_at
               FROM users WHERE id = $1"#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => user_from_db(row),
            None => Err(StoreError::NotFound("user".into())),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, name, email, role, phone, agent_code, created_at, updated_at
               FROM users WHERE lower(email) = lower($1)"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_db).transpose()
    }

    async fn find_user_by_agent_code(&self, agent_code: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, name, email, role, phone, agent_code, created_at, updated_at
               FROM users WHERE agent_code = $1"#,
        )
        .bind(agent_code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(user_from_db).transpose()
    }

    async fn list_agents(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, name, email, role, phone, agent_code, created_at, updated_at
               FROM users WHERE role = 'agent'
               ORDER BY created_at DESC, id ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(user_from_db).collect()
    }

    /// Patch a profile under `FOR UPDATE` so two racing patches serialize.
    async fn update_profile(
        &self,
        user_id: &UserId,
        patch: UserPatchRequest,
    ) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbUser>(
            r#"SELECT id, name, email, role, phone, agent_code, created_at, updated_at
               FROM users WHERE id = $1 FOR UPDATE"#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound("user".into()));
        };
        let mut user = user_from_db(row)?;
        apply_profile_patch(&mut user, patch)?;
        sqlx::query("UPDATE users SET name = $1, phone = $2, updated_at = $3 WHERE id = $4")
            .bind(&user.name)
            .bind(&user.phone)
            .bind(user.updated_at)
            .bind(user.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user)
    }

    /// Delete a user and their orders in one transaction, orders first.
    ///
    /// The removed orders are prefetched so each tombstone carries the final
    /// order state.
    async fn delete_user(&self, user_id: &UserId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_one(&mut *tx)
            .await?;
        if exists == 0 {
            return Err(StoreError::NotFound("user".into()));
        }
        let removed = purge_user_orders(&mut tx, user_id).await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        metrics::counter!("dataflex_order_changes_total", "op" => "deleted")
            .increment(removed.len() as u64);
        self.refresh_counts().await;
        Ok(())
    }

    async fn create_order(&self, order: Order) -> StoreResult<Order> {
        // Ownership check, insert, and change entry share a transaction so a
        // concurrent user delete serializes against this create.
        let mut tx = self.pool.begin().await?;
        let owner_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
                .bind(order.user_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        if !owner_exists {
            return Err(StoreError::NotFound("user".into()));
        }
        let insert = sqlx::query(
            r#"INSERT INTO orders (id, product_id, product_name, user_id, user_name, price,
                                   status, processing_note, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(order.id.as_uuid())
        .bind(order.product_id.as_str())
        .bind(&order.product_name)
        .bind(order.user_id.as_uuid())
        .bind(&order.user_name)
        .bind(order.price)
        .bind(order.status.as_str())
        .bind(&order.processing_note)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Duplicate("order exists".into()));
            }
            return Err(StoreError::Unexpected(err.into()));
        }
        insert_order_change(&mut tx, "Created", &order).await?;
        tx.commit().await?;
        metrics::counter!("dataflex_order_changes_total", "op" => "created").increment(1);
        self.refresh_counts().await;
        Ok(order)
    }

    async fn list_orders(
        &self,
        user_id: Option<&UserId>,
        status: Option<OrderStatus>,
    ) -> StoreResult<Vec<Order>> {
        let rows = match (user_id, status) {
            (Some(uid), Some(status)) => {
                sqlx::query_as::<_, DbOrder>(
                    r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                              processing_note, created_at, updated_at
                       FROM orders WHERE user_id = $1 AND status = $2
                       ORDER BY created_at DESC, id ASC"#,
                )
                .bind(uid.as_uuid())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            (Some(uid), None) => {
                sqlx::query_as::<_, DbOrder>(
                    r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                              processing_note, created_at, updated_at
                       FROM orders WHERE user_id = $1
                       ORDER BY created_at DESC, id ASC"#,
                )
                .bind(uid.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
            (None, Some(status)) => {
                sqlx::query_as::<_, DbOrder>(
                    r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                              processing_note, created_at, updated_at
                       FROM orders WHERE status = $1
                       ORDER BY created_at DESC, id ASC"#,
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            (None, None) => {
                sqlx::query_as::<_, DbOrder>(
                    r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                              processing_note, created_at, updated_at
                       FROM orders
                       ORDER BY created_at DESC, id ASC"#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(order_from_db).collect()
    }

    /// Apply a status transition under `FOR UPDATE`.
    ///
    /// The row lock makes precondition and lifecycle checks race-free: two
    /// concurrent updates serialize, and the loser sees the winner's status.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        update: OrderStatusUpdate,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, DbOrder>(
            r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                      processing_note, created_at, updated_at
               FROM orders WHERE id = $1 FOR UPDATE"#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound("order".into()));
        };
        let mut order = order_from_db(row)?;
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
        sqlx::query(
            "UPDATE orders SET status = $1, processing_note = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(order.status.as_str())
        .bind(&order.processing_note)
        .bind(order.updated_at)
        .bind(order.id.as_uuid())
        .execute(&mut *tx)
        .await?;
        insert_order_change(&mut tx, "Updated", &order).await?;
        tx.commit().await?;
        metrics::counter!("dataflex_order_changes_total", "op" => "updated").increment(1);
        metrics::counter!("dataflex_order_transitions_total", "to" => order.status.as_str())
            .increment(1);
        Ok(order)
    }

    async fn delete_all_orders(&self) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, DbOrder>(
            r#"SELECT id, product_id, product_name, user_id, user_name, price, status,
                      processing_note, created_at, updated_at
               FROM orders
               ORDER BY created_at ASC, id ASC"#,
        )
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM orders").execute(&mut *tx).await?;
        let mut removed = Vec::with_capacity(rows.len());
        for row in rows {
            removed.push(order_from_db(row)?);
        }
        for order in &removed {
            insert_order_change(&mut tx, "Deleted", order).await?;
        }
        tx.commit().await?;
        metrics::counter!("dataflex_order_changes_total", "op" => "deleted")
            .increment(removed.len() as u64);
        self.refresh_counts().await;
        Ok(removed.len() as u64)
    }

    async fn delete_orders_for_user(&self, user_id: &UserId) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = purge_user_orders(&mut tx, user_id).await?;
        tx.commit().await?;
        metrics::counter!("dataflex_order_changes_total", "op" => "deleted")
            .increment(removed.len() as u64);
        self.refresh_counts().await;
        Ok(removed.len() as u64)
    }

    async fn orders_snapshot(&self) -> StoreResult<Snapshot<Order>> {
        let items = self.list_orders(None, None).await?;
        let next_seq = self.next_change_seq().await?;
        Ok(Snapshot { items, next_seq })
    }

    async fn order_changes(&self, since: u64) -> StoreResult<ChangeSet<OrderChange>> {
        let rows = sqlx::query_as::<_, OrderChangeRow>(
            r#"SELECT seq, op, order_id, payload FROM order_changes
               WHERE seq >= $1 ORDER BY seq ASC LIMIT $2"#,
        )
        .bind(since as i64)
        .bind(self.limit())
        .fetch_all(&self.pool)
        .await?;
        let items: Vec<OrderChange> = rows.into_iter().map(order_change_from_row).collect();
        // A full page may have been cut short of the head; point the cursor
        // at the first unreturned change so a resuming caller skips nothing.
        let next_seq = if items.len() == self.limit() as usize {
            items.last().map_or(0, |item| item.seq + 1)
        } else {
            self.next_change_seq().await?
        };
        Ok(ChangeSet { items, next_seq })
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Postgres signals unique violations with SQLSTATE 23505.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code == "23505";
        }
    }
    false
}

fn parse_role(value: &str) -> StoreResult<Role> {
    match value {
        "admin" => Ok(Role::Admin),
        "agent" => Ok(Role::Agent),
        other => Err(StoreError::Unexpected(anyhow!("unknown role: {other}"))),
    }
}

/// Unknown ops map to `Deleted` so a poller seeing a future op kind errs on
/// the side of evicting its copy.
fn parse_change_op(op: &str) -> OrderChangeOp {
    match op {
        "Created" => OrderChangeOp::Created,
        "Updated" => OrderChangeOp::Updated,
        _ => OrderChangeOp::Deleted,
    }
}

fn user_from_db(row: DbUser) -> StoreResult<User> {
    Ok(User {
        id: UserId::from_uuid(row.id),
        name: row.name,
        email: row.email,
        role: parse_role(&row.role)?,
        phone: row.phone,
        agent_code: row.agent_code,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn order_from_db(row: DbOrder) -> StoreResult<Order> {
    let status = row
        .status
        .parse::<OrderStatus>()
        .map_err(|err| StoreError::Unexpected(anyhow!(err)))?;
    let product_id = ProductId::from_str(&row.product_id)
        .map_err(|_| StoreError::Unexpected(anyhow!("invalid product id: {}", row.product_id)))?;
    Ok(Order {
        id: OrderId::from_uuid(row.id),
        product_id,
        product_name: row.product_name,
        user_id: UserId::from_uuid(row.user_id),
        user_name: row.user_name,
        price: row.price,
        status,
        processing_note: row.processing_note,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn order_change_from_row(row: OrderChangeRow) -> OrderChange {
    OrderChange {
        seq: row.seq as u64,
        op: parse_change_op(&row.op),
        order_id: OrderId::from_uuid(row.order_id),
        order: row
            .payload
            .and_then(|value| serde_json::from_value(value).ok()),
    }
}
