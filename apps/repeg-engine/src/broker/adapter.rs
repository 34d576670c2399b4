//! Broker adapter trait and wire types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::BrokerError;
use crate::models::{OrderSide, Quote};

/// A new order to submit to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Caller-generated idempotency key. Re-submitting a spec with the same
    /// key must not create a second order.
    pub client_order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Quantity to trade.
    pub quantity: Decimal,
    /// Limit price; `None` submits a market order.
    pub limit_price: Option<Decimal>,
}

/// Broker acknowledgement of a placed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderHandle {
    /// Broker-assigned order id.
    pub order_id: String,
    /// When the broker accepted the order.
    pub accepted_at: DateTime<Utc>,
}

/// Point-in-time order state reported by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Broker order id.
    pub order_id: String,
    /// Cumulative filled quantity.
    pub filled_qty: Decimal,
    /// Average fill price, if any quantity filled.
    pub avg_fill_price: Option<Decimal>,
    /// Current limit price; `None` for market orders.
    pub limit_price: Option<Decimal>,
    /// Whether the order has reached a terminal state at the broker.
    pub is_terminal: bool,
    /// Whether the order is fully filled.
    pub is_filled: bool,
}

/// Abstraction over a brokerage's order and market-data endpoints.
///
/// Implementations must be safe to share across the monitoring loop's
/// concurrent per-order steps.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Submit a new order.
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, BrokerError>;

    /// Replace an order's limit price.
    ///
    /// Passing `None` converts the order to a market order (escalation).
    async fn replace_order(
        &self,
        order_id: &str,
        new_limit: Option<Decimal>,
    ) -> Result<(), BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError>;

    /// Fetch the current top-of-book quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError>;

    /// Fetch the current state of an order.
    async fn get_order_status(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError>;

    /// Adapter name for logging.
    fn broker_name(&self) -> &str;
}
