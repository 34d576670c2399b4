//! In-memory order tracker.
//!
//! Single source of truth for order state during one execution phase. All
//! mutation funnels through the tracker's synchronous methods; readers only
//! ever receive owned snapshots, never live references. Methods take the lock
//! briefly and never across an await point.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::models::{OrderStatus, TrackedOrder};

/// Errors raised by tracker mutations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackerError {
    /// An order with this id is already registered.
    #[error("duplicate order id: {order_id}")]
    DuplicateOrder {
        /// Offending order id.
        order_id: String,
    },

    /// No order with this id is registered.
    #[error("unknown order id: {order_id}")]
    UnknownOrder {
        /// Offending order id.
        order_id: String,
    },

    /// A mutation would break an order invariant.
    #[error("invariant violation on {order_id}: {detail}")]
    InvariantViolation {
        /// Order whose invariant would break.
        order_id: String,
        /// What was attempted.
        detail: String,
    },
}

/// Authoritative record of every order placed during one phase.
#[derive(Debug)]
pub struct OrderTracker {
    orders: RwLock<HashMap<String, TrackedOrder>>,
    max_repegs: u32,
}

impl OrderTracker {
    /// Create an empty tracker enforcing the given repeg budget.
    #[must_use]
    pub fn new(max_repegs: u32) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            max_repegs,
        }
    }

    /// Register a freshly placed order.
    ///
    /// Fails if the id is already registered; the original registration is
    /// left untouched.
    pub fn register(&self, order: TrackedOrder) -> Result<(), TrackerError> {
        let mut orders = self.orders.write();
        if orders.contains_key(&order.order_id) {
            return Err(TrackerError::DuplicateOrder {
                order_id: order.order_id,
            });
        }
        tracing::debug!(
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            qty = %order.original_qty,
            "order registered"
        );
        orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// Record cumulative fill progress reported by the broker.
    ///
    /// Fills are monotonic: a report below the current filled quantity is
    /// ignored, and one above the original quantity is rejected.
    pub fn record_fill(
        &self,
        order_id: &str,
        filled_qty: Decimal,
        avg_price: Option<Decimal>,
    ) -> Result<(), TrackerError> {
        let mut orders = self.orders.write();
        let order = Self::get_mut(&mut orders, order_id)?;

        if filled_qty > order.original_qty {
            return Err(TrackerError::InvariantViolation {
                order_id: order_id.to_string(),
                detail: format!(
                    "fill {filled_qty} exceeds original quantity {}",
                    order.original_qty
                ),
            });
        }
        if filled_qty <= order.filled_qty {
            return Ok(());
        }

        order.filled_qty = filled_qty;
        if let Some(price) = avg_price {
            order.avg_fill_price = price;
        }
        order.last_action_at = Utc::now();

        if order.filled_qty == order.original_qty {
            order.status = OrderStatus::Filled;
        } else if !order.status.is_terminal() && !order.escalated {
            order.status = OrderStatus::PartiallyFilled;
        }
        tracing::debug!(
            order_id = %order_id,
            filled = %order.filled_qty,
            remaining = %order.remaining_qty(),
            "fill recorded"
        );
        Ok(())
    }

    /// Record a successful reprice.
    ///
    /// Fails if the order is already at the configured repeg budget.
    pub fn record_repeg(&self, order_id: &str, new_price: Decimal) -> Result<(), TrackerError> {
        let mut orders = self.orders.write();
        let order = Self::get_mut(&mut orders, order_id)?;

        if order.repeg_count >= self.max_repegs {
            return Err(TrackerError::InvariantViolation {
                order_id: order_id.to_string(),
                detail: format!("repeg beyond budget of {}", self.max_repegs),
            });
        }

        order.repeg_count += 1;
        order.limit_price = Some(new_price);
        order.last_action_at = Utc::now();
        if !order.status.is_terminal() {
            order.status = OrderStatus::Repegged;
        }
        tracing::info!(
            order_id = %order_id,
            new_price = %new_price,
            repeg_count = order.repeg_count,
            "order repegged"
        );
        Ok(())
    }

    /// Record conversion to a marketable order.
    pub fn record_escalation(&self, order_id: &str) -> Result<(), TrackerError> {
        let mut orders = self.orders.write();
        let order = Self::get_mut(&mut orders, order_id)?;

        order.escalated = true;
        order.limit_price = None;
        order.last_action_at = Utc::now();
        if !order.status.is_terminal() {
            order.status = OrderStatus::Escalated;
        }
        tracing::info!(order_id = %order_id, "order escalated to market");
        Ok(())
    }

    /// Transition an order's status.
    ///
    /// Terminal statuses are sticky; once an order is terminal, every later
    /// transition is a no-op. The first terminal status wins, so a late
    /// `Failed` mark cannot overwrite `Filled`.
    pub fn mark_status(&self, order_id: &str, status: OrderStatus) -> Result<(), TrackerError> {
        let mut orders = self.orders.write();
        let order = Self::get_mut(&mut orders, order_id)?;

        if order.status.is_terminal() {
            return Ok(());
        }
        order.status = status;
        Ok(())
    }

    /// Immutable copy of an order's current state.
    pub fn snapshot(&self, order_id: &str) -> Result<TrackedOrder, TrackerError> {
        self.orders
            .read()
            .get(order_id)
            .cloned()
            .ok_or_else(|| TrackerError::UnknownOrder {
                order_id: order_id.to_string(),
            })
    }

    /// Snapshots of all non-terminal orders.
    #[must_use]
    pub fn active_orders(&self) -> Vec<TrackedOrder> {
        self.orders
            .read()
            .values()
            .filter(|order| !order.is_terminal())
            .cloned()
            .collect()
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether the tracker holds no orders.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    fn get_mut<'a>(
        orders: &'a mut HashMap<String, TrackedOrder>,
        order_id: &str,
    ) -> Result<&'a mut TrackedOrder, TrackerError> {
        orders.get_mut(order_id).ok_or_else(|| TrackerError::UnknownOrder {
            order_id: order_id.to_string(),
        })
    }
}
