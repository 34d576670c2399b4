//! Repeg decision engine.
//!
//! A pure function from order state, market data, and elapsed time to an
//! action verdict. No I/O happens here; the monitoring loop carries out the
//! verdicts against the broker.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::config::MonitoringConfig;
use crate::models::{Quote, TrackedOrder};

use super::pricing::repeg_candidate;

/// Why an order's monitoring should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// The full quantity has been filled.
    Filled,
    /// The broker reports a terminal state (cancellation, rejection, expiry).
    BrokerTerminal,
}

/// Verdict for one order on one monitoring tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepegDecision {
    /// Leave the order as it is.
    Hold,
    /// Replace the order's limit with a more competitive price.
    Repeg(Decimal),
    /// Convert the order to a marketable order.
    EscalateToMarket,
    /// Stop monitoring the order.
    Terminate(TerminateReason),
}

/// Decide what to do with an open order.
///
/// Deterministic: identical inputs always yield the identical verdict.
/// `elapsed` is the time since the order's last placement, reprice, or fill.
/// A missing quote always yields `Hold`; the engine never reprices blind.
#[must_use]
pub fn decide(
    order: &TrackedOrder,
    quote: Option<&Quote>,
    elapsed: Duration,
    config: &MonitoringConfig,
) -> RepegDecision {
    if order.remaining_qty() <= Decimal::ZERO {
        return RepegDecision::Terminate(TerminateReason::Filled);
    }
    if order.is_terminal() {
        return RepegDecision::Terminate(TerminateReason::BrokerTerminal);
    }

    // A marketable order has no limit to improve; wait for it to resolve.
    let Some(current_limit) = order.limit_price else {
        return RepegDecision::Hold;
    };

    if elapsed < config.fill_wait {
        return RepegDecision::Hold;
    }

    if order.repeg_count < config.max_repegs {
        let Some(quote) = quote else {
            return RepegDecision::Hold;
        };
        return repeg_candidate(order.side, current_limit, quote, config.repeg_step_bps)
            .map_or(RepegDecision::EscalateToMarket, RepegDecision::Repeg);
    }

    // Budget spent: grant one extended wait window before forcing the issue.
    if elapsed < config.extended_wait() {
        return RepegDecision::Hold;
    }

    RepegDecision::EscalateToMarket
}
