//! Trade requests produced by the upstream rebalancing step.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// Urgency hint shaping initial order aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Low urgency, optimize for best price.
    Low,
    /// Normal urgency, balance price and execution.
    Normal,
    /// High urgency, prioritize execution over price.
    High,
}

impl Default for Urgency {
    fn default() -> Self {
        Self::Normal
    }
}

/// Execution phase within one rebalance run.
///
/// All SELL-phase orders resolve before any BUY-phase order is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Sell phase: frees buying power.
    Sell,
    /// Buy phase: consumes buying power.
    Buy,
}

impl Phase {
    /// Returns true if `side` belongs to this phase.
    #[must_use]
    pub const fn matches_side(&self, side: OrderSide) -> bool {
        matches!(
            (self, side),
            (Self::Sell, OrderSide::Sell) | (Self::Buy, OrderSide::Buy)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "SELL"),
            Self::Buy => write!(f, "BUY"),
        }
    }
}

/// One desired trade from the portfolio rebalancer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Instrument symbol.
    pub symbol: String,
    /// Trade side.
    pub side: OrderSide,
    /// Desired quantity.
    pub quantity: Decimal,
    /// Urgency hint.
    pub urgency: Urgency,
    /// Correlation ID for end-to-end auditing.
    pub correlation_id: String,
    /// Causation ID linking back to the upstream decision.
    pub causation_id: String,
}

impl TradeRequest {
    /// Create a trade request with the given urgency.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        urgency: Urgency,
        correlation_id: impl Into<String>,
        causation_id: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            urgency,
            correlation_id: correlation_id.into(),
            causation_id: causation_id.into(),
        }
    }
}
