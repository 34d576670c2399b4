//! Final per-trade execution results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderSide, OrderStatus, TrackedOrder};

/// Immutable final record for one input trade request.
///
/// The orchestrator returns exactly one of these per request, preserving the
/// input order, including requests whose initial placement failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Instrument symbol.
    pub symbol: String,
    /// Trade side.
    pub side: OrderSide,
    /// Originally requested quantity.
    pub requested_qty: Decimal,
    /// Quantity actually filled.
    pub filled_qty: Decimal,
    /// Average fill price (zero when nothing filled).
    pub avg_fill_price: Decimal,
    /// Final broker order ID; `None` when placement itself failed.
    pub order_id: Option<String>,
    /// Final order status.
    pub status: OrderStatus,
    /// How many times the order was repriced.
    pub repeg_count: u32,
    /// Whether the order was force-converted to a marketable order.
    pub escalated: bool,
    /// Error detail when the order ended abnormally.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Build a result from a tracked order's final snapshot.
    #[must_use]
    pub fn from_order(order: &TrackedOrder, error: Option<String>) -> Self {
        Self {
            symbol: order.symbol.clone(),
            side: order.side,
            requested_qty: order.original_qty,
            filled_qty: order.filled_qty,
            avg_fill_price: order.avg_fill_price,
            order_id: Some(order.order_id.clone()),
            status: order.status,
            repeg_count: order.repeg_count,
            escalated: order.escalated,
            error,
        }
    }

    /// Build a zero-fill result for a request that never made it to the broker.
    #[must_use]
    pub fn placement_failed(
        symbol: impl Into<String>,
        side: OrderSide,
        requested_qty: Decimal,
        error: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            requested_qty,
            filled_qty: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            order_id: None,
            status: OrderStatus::Rejected,
            repeg_count: 0,
            escalated: false,
            error: Some(error.into()),
        }
    }

    /// Returns true if the full requested quantity was filled.
    #[must_use]
    pub fn is_complete_fill(&self) -> bool {
        self.filled_qty >= self.requested_qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_failed_has_zero_fill() {
        let result = ExecutionResult::placement_failed(
            "AAPL",
            OrderSide::Buy,
            Decimal::new(100, 0),
            "order rejected: insufficient buying power",
        );

        assert_eq!(result.filled_qty, Decimal::ZERO);
        assert_eq!(result.status, OrderStatus::Rejected);
        assert!(result.order_id.is_none());
        assert!(result.error.is_some());
        assert!(!result.is_complete_fill());
    }

    #[test]
    fn from_order_copies_final_state() {
        let mut order = TrackedOrder::new(
            "ord-1",
            "MSFT",
            OrderSide::Sell,
            Decimal::new(50, 0),
            Some(Decimal::new(400, 0)),
            "corr-1",
            "cause-1",
        );
        order.filled_qty = Decimal::new(50, 0);
        order.avg_fill_price = Decimal::new(401, 0);
        order.status = OrderStatus::Filled;
        order.repeg_count = 2;

        let result = ExecutionResult::from_order(&order, None);
        assert_eq!(result.order_id.as_deref(), Some("ord-1"));
        assert_eq!(result.repeg_count, 2);
        assert!(result.is_complete_fill());
        assert!(result.error.is_none());
    }
}
