//! Execution core: tracker, decision engine, monitoring loop, orchestrator.

mod decision;
mod monitor;
mod orchestrator;
mod pricing;
mod tracker;

pub use decision::{RepegDecision, TerminateReason, decide};
pub use monitor::RepegMonitor;
pub use orchestrator::SmartExecutionOrchestrator;
pub use pricing::{PricingConfig, repeg_candidate};
pub use tracker::{OrderTracker, TrackerError};
