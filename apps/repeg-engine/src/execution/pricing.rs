//! Limit price calculation for initial placement and reprices.
//!
//! Offsets are expressed in basis points of the quote midpoint so pricing
//! scales with the instrument's price level. Prices are rounded to cents.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{OrderSide, Quote, Urgency};

const BPS_DIVISOR: Decimal = dec!(10000);
const PRICE_DP: u32 = 2;

/// Pricing offsets for initial order placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Passive limit offset inside the spread, in basis points of mid.
    pub passive_offset_bps: u32,
    /// Marketable limit offset past the touch, in basis points of mid.
    pub cross_bps: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            passive_offset_bps: 2,
            cross_bps: 5,
        }
    }
}

impl PricingConfig {
    /// Initial limit price for a new order.
    ///
    /// HIGH urgency gets a marketable limit crossing the spread; NORMAL and
    /// LOW get a passive limit pegged just inside the touch.
    #[must_use]
    pub fn initial_price(&self, side: OrderSide, urgency: Urgency, quote: &Quote) -> Decimal {
        match urgency {
            Urgency::High => self.crossing_price(side, quote),
            Urgency::Normal | Urgency::Low => self.passive_price(side, quote),
        }
    }

    /// Passive limit: rest near your own side of the spread.
    #[must_use]
    pub fn passive_price(&self, side: OrderSide, quote: &Quote) -> Decimal {
        let offset = quote.mid() * Decimal::from(self.passive_offset_bps) / BPS_DIVISOR;
        let price = match side {
            OrderSide::Buy => quote.bid + offset,
            OrderSide::Sell => quote.ask - offset,
        };
        price.round_dp(PRICE_DP)
    }

    /// Marketable limit: cross the spread with room past the touch.
    #[must_use]
    pub fn crossing_price(&self, side: OrderSide, quote: &Quote) -> Decimal {
        let offset = quote.mid() * Decimal::from(self.cross_bps) / BPS_DIVISOR;
        let price = match side {
            OrderSide::Buy => quote.ask + offset,
            OrderSide::Sell => quote.bid - offset,
        };
        price.round_dp(PRICE_DP)
    }
}

/// Next reprice candidate for an open limit order.
///
/// Moves the limit toward the aggressive side of the spread (buy toward the
/// ask, sell toward the bid), capped at `step_bps` of mid per reprice and
/// never past the touch. Returns `None` when the current limit is already at
/// or past the touch, i.e. there is nothing left to improve.
#[must_use]
pub fn repeg_candidate(
    side: OrderSide,
    current_limit: Decimal,
    quote: &Quote,
    step_bps: u32,
) -> Option<Decimal> {
    let step = quote.mid() * Decimal::from(step_bps) / BPS_DIVISOR;
    let candidate = match side {
        OrderSide::Buy => (current_limit + step).min(quote.ask),
        OrderSide::Sell => (current_limit - step).max(quote.bid),
    };
    let candidate = candidate.round_dp(PRICE_DP);

    let improves = match side {
        OrderSide::Buy => candidate > current_limit,
        OrderSide::Sell => candidate < current_limit,
    };
    improves.then_some(candidate)
}
