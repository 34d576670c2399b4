//! Market quote snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Best bid/ask snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    /// Instrument symbol.
    pub symbol: String,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Size at the best bid.
    pub bid_size: Decimal,
    /// Size at the best ask.
    pub ask_size: Decimal,
    /// Quote timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Create a quote stamped with the current time.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        bid: Decimal,
        ask: Decimal,
        bid_size: Decimal,
        ask_size: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            ask,
            bid_size,
            ask_size,
            timestamp: Utc::now(),
        }
    }

    /// Midpoint of the spread.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    /// Spread width (ask minus bid).
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Returns true if the quote is older than `max_age`.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        let age = Utc::now() - self.timestamp;
        age.to_std().map_or(false, |a| a > max_age)
    }
}
