//! Reporting calculations over orders and agents.
//!
//! # Purpose
//! Pure functions behind the stats and analytics endpoints. Everything here
//! works on plain slices, so the same arithmetic serves both storage backends
//! and is trivially unit-testable.
//!
//! # Revenue policy
//! Cancelled orders never count toward revenue figures. They still count in
//! order totals and breakdowns so dashboards can show how many fell through.
use crate::model::{Order, OrderStatus, Role, User, newest_first};
use chrono::{DateTime, Days, NaiveDate, Utc};
use dataflex_common::ids::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Days covered by the daily report, today included.
pub const DAILY_WINDOW_DAYS: u64 = 7;

/// Number of entries served by the recent-activity report.
pub const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Order counts by status plus total revenue.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct OrderStats {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub processing_orders: u64,
    pub completed_orders: u64,
    pub cancelled_orders: u64,
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
}

/// Share of all orders held by one status.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct StatusBreakdown {
    pub status: OrderStatus,
    pub count: u64,
    pub percentage: f64,
}

/// One agent's position in the sales ranking.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct AgentRank {
    #[schema(value_type = String)]
    pub user_id: UserId,
    pub name: String,
    pub agent_code: String,
    pub order_count: u64,
    #[schema(value_type = String)]
    pub revenue: Decimal,
}

/// Orders and revenue for one calendar day.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub count: u64,
    #[schema(value_type = String)]
    pub revenue: Decimal,
}

/// One line in the recent-activity feed.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ActivityEntry {
    pub date: DateTime<Utc>,
    pub description: String,
    pub status: OrderStatus,
}

fn counts_toward_revenue(order: &Order) -> bool {
    order.status != OrderStatus::Cancelled
}

/// Totals across a set of orders.
pub fn summarize(orders: &[Order]) -> OrderStats {
    let mut stats = OrderStats {
        total_orders: orders.len() as u64,
        pending_orders: 0,
        processing_orders: 0,
        completed_orders: 0,
        cancelled_orders: 0,
        total_revenue: Decimal::ZERO,
    };
    for order in orders {
        match order.status {
            OrderStatus::Pending => stats.pending_orders += 1,
            OrderStatus::Processing => stats.processing_orders += 1,
            OrderStatus::Completed => stats.completed_orders += 1,
            OrderStatus::Cancelled => stats.cancelled_orders += 1,
        }
        if counts_toward_revenue(order) {
            stats.total_revenue += order.price;
        }
    }
    stats
}

/// Per-status counts and percentage shares. Statuses with no orders are
/// omitted; an empty input yields an empty breakdown rather than dividing by
/// zero.
pub fn orders_by_status(orders: &[Order]) -> Vec<StatusBreakdown> {
    if orders.is_empty() {
        return Vec::new();
    }
    let total = orders.len() as f64;
    OrderStatus::ALL
        .iter()
        .filter_map(|status| {
            let count = orders.iter().filter(|o| o.status == *status).count() as u64;
            (count > 0).then(|| StatusBreakdown {
                status: *status,
                count,
                percentage: count as f64 * 100.0 / total,
            })
        })
        .collect()
}

/// Full agent ranking by order count, then name for equal counts.
///
/// Every agent appears, including those with no orders yet. Orders whose
/// owner is not in `users` with the agent role are ignored, so admin-placed
/// orders never rank.
pub fn top_agents(orders: &[Order], users: &[User]) -> Vec<AgentRank> {
    let mut ranks: Vec<AgentRank> = users
        .iter()
        .filter(|user| user.role == Role::Agent)
        .map(|user| AgentRank {
            user_id: user.id,
            name: user.name.clone(),
            agent_code: user.agent_code.clone(),
            order_count: 0,
            revenue: Decimal::ZERO,
        })
        .collect();
    let by_user: HashMap<UserId, usize> = ranks
        .iter()
        .enumerate()
        .map(|(idx, rank)| (rank.user_id, idx))
        .collect();
    for order in orders {
        let Some(idx) = by_user.get(&order.user_id).copied() else {
            continue;
        };
        let rank = &mut ranks[idx];
        rank.order_count += 1;
        if counts_toward_revenue(order) {
            rank.revenue += order.price;
        }
    }
    ranks.sort_by(|a, b| {
        b.order_count
            .cmp(&a.order_count)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranks
}

/// Orders and revenue per UTC calendar day for the trailing window, oldest
/// day first. Days with no orders still appear with zero counts.
pub fn daily_orders(orders: &[Order], today: NaiveDate) -> Vec<DailyBucket> {
    (0..DAILY_WINDOW_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Days::new(offset);
            let mut count = 0;
            let mut revenue = Decimal::ZERO;
            for order in orders {
                if order.created_at.date_naive() == date {
                    count += 1;
                    if counts_toward_revenue(order) {
                        revenue += order.price;
                    }
                }
            }
            DailyBucket {
                date,
                count,
                revenue,
            }
        })
        .collect()
}

/// The `limit` most recent orders as activity lines, newest first.
pub fn recent_activity(orders: &[Order], limit: usize) -> Vec<ActivityEntry> {
    let mut sorted = orders.to_vec();
    sorted.sort_by(newest_first);
    sorted
        .into_iter()
        .take(limit)
        .map(|order| ActivityEntry {
            date: order.created_at,
            description: describe_order(&order),
            status: order.status,
        })
        .collect()
}

/// Order counts keyed by owner, used to annotate agent listings.
pub fn order_counts_by_user(orders: &[Order]) -> HashMap<UserId, u64> {
    let mut counts = HashMap::new();
    for order in orders {
        *counts.entry(order.user_id).or_insert(0) += 1;
    }
    counts
}

/// Short human label for an order. The id prefix is enough to find the order
/// without dumping a full UUID into the feed.
fn describe_order(order: &Order) -> String {
    let id = order.id.to_string();
    format!("Order {} - {}", &id[..8], order.product_name)
}
