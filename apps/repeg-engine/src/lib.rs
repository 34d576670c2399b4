// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Repeg Engine - Smart Order Execution Core
//!
//! Adaptive order execution for a rebalance run. Given a batch of trade
//! requests, the engine places orders with a broker, tracks their fill
//! progress, repegs unfilled limit orders as the market moves, and escalates
//! to marketable orders when the repeg budget is exhausted.
//!
//! # Components
//!
//! - [`execution::OrderTracker`] - authoritative in-memory record of every
//!   order placed during one phase; the sole owner of order mutation.
//! - [`execution::decide`] - pure decision function: hold, repeg, escalate,
//!   or terminate, given an order snapshot and a fresh quote.
//! - [`execution::RepegMonitor`] - time-bounded polling loop driving the
//!   decision engine for a set of concurrently active orders.
//! - [`execution::SmartExecutionOrchestrator`] - per-phase facade: places
//!   initial orders, runs the monitor, assembles one result per request.
//! - [`broker::BrokerAdapter`] - the fixed broker interface, with a retrying
//!   decorator ([`broker::RetryingBroker`]) handling transient failures.
//!
//! # Phase ordering
//!
//! All SELL orders resolve before any BUY order is placed, so a rebalance
//! never spends buying power it has not yet freed up.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Broker adapter trait, error taxonomy, retry decorator, and test mock.
pub mod broker;

/// Per-run monitoring configuration and validation.
pub mod config;

/// Tracker, decision engine, monitoring loop, and orchestrator.
pub mod execution;

/// Order, quote, trade-request, and result value types.
pub mod models;

/// Tracing subscriber initialization.
pub mod telemetry;

pub use broker::{BrokerAdapter, BrokerError, MockBroker, RetryPolicy, RetryingBroker};
pub use config::{ConfigError, MonitoringConfig};
pub use execution::{
    OrderTracker, RepegDecision, RepegMonitor, SmartExecutionOrchestrator, TrackerError, decide,
};
pub use models::{
    ExecutionResult, OrderSide, OrderStatus, Phase, Quote, TrackedOrder, TradeRequest, Urgency,
};
