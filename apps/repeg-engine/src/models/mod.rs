//! Value types shared across the engine.

mod order;
mod quote;
mod result;
mod trade;

pub use order::{OrderSide, OrderStatus, TrackedOrder};
pub use quote::Quote;
pub use result::ExecutionResult;
pub use trade::{Phase, TradeRequest, Urgency};
