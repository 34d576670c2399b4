//! Order-related types for execution tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order status in the repeg lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed with the broker, resting at its initial price.
    Placed,
    /// Order partially filled.
    PartiallyFilled,
    /// Order repriced at least once and still resting.
    Repegged,
    /// Order converted to a marketable order, awaiting completion.
    Escalated,
    /// Order completely filled.
    Filled,
    /// Order cancelled.
    Cancelled,
    /// Order rejected by the broker.
    Rejected,
    /// Order expired.
    Expired,
    /// Order abandoned after an unrecoverable error (e.g. escalation failed).
    Failed,
}

impl OrderStatus {
    /// Returns true if the order has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired | Self::Failed
        )
    }

    /// Returns true if the order is still working at the broker.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Placed => "PLACED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Repegged => "REPEGGED",
            Self::Escalated => "ESCALATED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// One tracked order: the authoritative record of a broker order placed
/// during a phase.
///
/// Ownership: only the [`crate::execution::OrderTracker`] mutates these;
/// every other component works on immutable snapshots.
///
/// Invariants: `filled_qty <= original_qty` at all times, and `repeg_count`
/// never exceeds the configured maximum. Both are enforced by the tracker.
///
/// A repeg replaces the order in place: the logical order identity (and
/// `order_id`) is stable across reprices and escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedOrder {
    /// Broker's order ID (opaque, stable across replaces).
    pub order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Originally requested quantity.
    pub original_qty: Decimal,
    /// Cumulative filled quantity (monotonic non-decreasing).
    pub filled_qty: Decimal,
    /// Average fill price across all fills.
    pub avg_fill_price: Decimal,
    /// Current limit price; `None` for marketable orders.
    pub limit_price: Option<Decimal>,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Number of reprices applied so far.
    pub repeg_count: u32,
    /// Whether the order was converted to a marketable order.
    pub escalated: bool,
    /// Placement timestamp.
    pub placed_at: DateTime<Utc>,
    /// Timestamp of the last placement/repeg/escalation action.
    pub last_action_at: DateTime<Utc>,
    /// Correlation ID propagated from the trade request.
    pub correlation_id: String,
    /// Causation ID propagated from the trade request.
    pub causation_id: String,
}

impl TrackedOrder {
    /// Create a freshly placed order record.
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        original_qty: Decimal,
        limit_price: Option<Decimal>,
        correlation_id: impl Into<String>,
        causation_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            side,
            original_qty,
            filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            limit_price,
            status: OrderStatus::Placed,
            repeg_count: 0,
            escalated: false,
            placed_at: now,
            last_action_at: now,
            correlation_id: correlation_id.into(),
            causation_id: causation_id.into(),
        }
    }

    /// Quantity still unfilled.
    #[must_use]
    pub fn remaining_qty(&self) -> Decimal {
        self.original_qty - self.filled_qty
    }

    /// Returns true if the order has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Placed.is_terminal());
        assert!(!OrderStatus::Repegged.is_terminal());
        assert!(!OrderStatus::Escalated.is_terminal());
    }

    #[test]
    fn order_status_active() {
        assert!(OrderStatus::Placed.is_active());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(OrderStatus::Escalated.is_active());
        assert!(!OrderStatus::Expired.is_active());
    }

    #[test]
    fn remaining_qty_derived_from_fills() {
        let mut order = TrackedOrder::new(
            "ord-1",
            "AAPL",
            OrderSide::Buy,
            Decimal::new(100, 0),
            Some(Decimal::new(150, 0)),
            "corr-1",
            "cause-1",
        );
        assert_eq!(order.remaining_qty(), Decimal::new(100, 0));

        order.filled_qty = Decimal::new(40, 0);
        assert_eq!(order.remaining_qty(), Decimal::new(60, 0));
    }
}
