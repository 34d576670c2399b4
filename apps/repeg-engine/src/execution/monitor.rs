//! Repeg monitoring loop.
//!
//! Drives a batch of concurrently active orders to terminal state within one
//! phase. Each tick polls every active order's broker status, consults the
//! decision engine, and dispatches the verdicts concurrently (fan-out per
//! tick, fan-in before the next). The loop exits when every order is
//! terminal, the phase deadline elapses, or the caller cancels; in the latter
//! two cases remaining open orders are force-escalated and awaited once more
//! so every order still ends with a recorded result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerAdapter;
use crate::config::{ConfigError, MonitoringConfig};
use crate::models::{ExecutionResult, OrderStatus, TrackedOrder};

use super::decision::{RepegDecision, decide};
use super::tracker::OrderTracker;

type ErrorMap = Mutex<HashMap<String, String>>;

/// Time-bounded polling loop that resolves a batch of orders.
pub struct RepegMonitor {
    broker: Arc<dyn BrokerAdapter>,
    tracker: Arc<OrderTracker>,
    config: MonitoringConfig,
    cancel: CancellationToken,
}

impl RepegMonitor {
    /// Create a monitor over the given broker and tracker.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        tracker: Arc<OrderTracker>,
        config: MonitoringConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            broker,
            tracker,
            config,
            cancel,
        }
    }

    /// Monitor the given orders until all are terminal or time runs out.
    ///
    /// Takes the orders as placed, so every result carries the order's own
    /// identity even if the tracker loses the entry. Validates the
    /// configuration before taking any action. Returns exactly one result
    /// per input order, in input order, even when individual orders fail.
    pub async fn run(
        &self,
        orders: &[TrackedOrder],
        correlation_id: &str,
    ) -> Result<Vec<ExecutionResult>, ConfigError> {
        self.config.validate()?;

        let order_ids: Vec<String> = orders.iter().map(|order| order.order_id.clone()).collect();
        let order_ids = order_ids.as_slice();
        let errors: ErrorMap = Mutex::new(HashMap::new());
        let deadline = tokio::time::Instant::now() + self.config.phase_deadline;
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            correlation_id,
            phase = %self.config.phase,
            orders = order_ids.len(),
            broker = self.broker.broker_name(),
            "repeg monitoring started"
        );

        loop {
            if self.all_terminal(order_ids) {
                tracing::info!(correlation_id, "all orders terminal");
                break;
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::warn!(correlation_id, "cancellation requested, force-escalating open orders");
                    self.force_escalate_remaining(order_ids, correlation_id, &errors).await;
                    self.await_forced(order_ids, correlation_id, &errors).await;
                    break;
                }
                () = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(correlation_id, "phase deadline reached, force-escalating open orders");
                    self.force_escalate_remaining(order_ids, correlation_id, &errors).await;
                    self.await_forced(order_ids, correlation_id, &errors).await;
                    break;
                }
                _ = interval.tick() => {
                    self.tick(order_ids, correlation_id, &errors).await;
                }
            }
        }

        Ok(self.assemble_results(orders, &errors))
    }

    /// One monitoring tick: evaluate and act on every active order.
    async fn tick(&self, order_ids: &[String], correlation_id: &str, errors: &ErrorMap) {
        let active = self.active_snapshots(order_ids);
        if active.is_empty() {
            return;
        }
        join_all(
            active
                .into_iter()
                .map(|order| self.step_order(order, correlation_id, errors)),
        )
        .await;
    }

    /// Advance one order: poll its status, then carry out the verdict.
    async fn step_order(&self, order: TrackedOrder, correlation_id: &str, errors: &ErrorMap) {
        let order_id = order.order_id.clone();

        if !self.poll_order(&order_id, correlation_id, errors).await {
            return;
        }

        let Ok(order) = self.tracker.snapshot(&order_id) else {
            return;
        };
        if order.is_terminal() {
            return;
        }

        let quote = match self.broker.get_quote(&order.symbol).await {
            Ok(quote) => Some(quote),
            Err(err) => {
                tracing::warn!(
                    correlation_id,
                    order_id = %order_id,
                    symbol = %order.symbol,
                    error = %err,
                    "quote unavailable, holding"
                );
                None
            }
        };

        let elapsed = (Utc::now() - order.last_action_at)
            .to_std()
            .unwrap_or_default();

        match decide(&order, quote.as_ref(), elapsed, &self.config) {
            RepegDecision::Hold | RepegDecision::Terminate(_) => {}
            RepegDecision::Repeg(price) => {
                self.apply_repeg(&order_id, price, correlation_id, errors)
                    .await;
            }
            RepegDecision::EscalateToMarket => {
                self.apply_escalation(&order_id, correlation_id, errors)
                    .await;
            }
        }
    }

    /// Poll broker status and fold it into the tracker.
    ///
    /// Returns false when the order needs no further evaluation this tick.
    async fn poll_order(&self, order_id: &str, correlation_id: &str, errors: &ErrorMap) -> bool {
        match self.broker.get_order_status(order_id).await {
            Ok(snapshot) => {
                if let Err(err) =
                    self.tracker
                        .record_fill(order_id, snapshot.filled_qty, snapshot.avg_fill_price)
                {
                    tracing::error!(
                        correlation_id,
                        order_id = %order_id,
                        error = %err,
                        "broker fill report violates tracker invariant"
                    );
                    self.fail_order(order_id, err.to_string(), errors);
                    return false;
                }
                if snapshot.is_terminal {
                    let status = if snapshot.is_filled {
                        OrderStatus::Filled
                    } else {
                        OrderStatus::Cancelled
                    };
                    let _ = self.tracker.mark_status(order_id, status);
                    return false;
                }
                true
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    correlation_id,
                    order_id = %order_id,
                    error = %err,
                    "status poll failed, retrying next tick"
                );
                false
            }
            Err(err) => {
                self.fail_order(order_id, err.to_string(), errors);
                false
            }
        }
    }

    async fn apply_repeg(
        &self,
        order_id: &str,
        price: Decimal,
        correlation_id: &str,
        errors: &ErrorMap,
    ) {
        match self.broker.replace_order(order_id, Some(price)).await {
            Ok(()) => {
                if let Err(err) = self.tracker.record_repeg(order_id, price) {
                    self.fail_order(order_id, err.to_string(), errors);
                } else {
                    tracing::info!(
                        correlation_id,
                        order_id = %order_id,
                        new_price = %price,
                        "repeg applied"
                    );
                }
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    correlation_id,
                    order_id = %order_id,
                    error = %err,
                    "repeg replace failed transiently, retrying next tick"
                );
            }
            Err(err) => {
                self.reject_replace(order_id, err.to_string(), correlation_id, errors)
                    .await;
            }
        }
    }

    async fn apply_escalation(&self, order_id: &str, correlation_id: &str, errors: &ErrorMap) {
        match self.broker.replace_order(order_id, None).await {
            Ok(()) => {
                if let Err(err) = self.tracker.record_escalation(order_id) {
                    self.fail_order(order_id, err.to_string(), errors);
                } else {
                    tracing::warn!(
                        correlation_id,
                        order_id = %order_id,
                        "order escalated to market"
                    );
                }
            }
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    correlation_id,
                    order_id = %order_id,
                    error = %err,
                    "escalation replace failed transiently, retrying next tick"
                );
            }
            Err(err) => {
                self.reject_replace(
                    order_id,
                    format!("escalation failed: {err}"),
                    correlation_id,
                    errors,
                )
                .await;
            }
        }
    }

    /// A replace can bounce because the order went terminal between the
    /// status poll and the replace call. Re-poll before declaring failure so
    /// a fill that raced the replace is recorded as a fill, not an error.
    async fn reject_replace(
        &self,
        order_id: &str,
        error: String,
        correlation_id: &str,
        errors: &ErrorMap,
    ) {
        self.poll_order(order_id, correlation_id, errors).await;
        match self.tracker.snapshot(order_id) {
            Ok(order) if order.is_terminal() => {
                tracing::info!(
                    correlation_id,
                    order_id = %order_id,
                    status = ?order.status,
                    error = %error,
                    "replace rejected on terminal order, keeping broker state"
                );
            }
            _ => self.fail_order(order_id, error, errors),
        }
    }

    /// Convert all still-open orders to marketable orders.
    async fn force_escalate_remaining(
        &self,
        order_ids: &[String],
        correlation_id: &str,
        errors: &ErrorMap,
    ) {
        let open: Vec<TrackedOrder> = self
            .active_snapshots(order_ids)
            .into_iter()
            .filter(|order| !order.escalated)
            .collect();

        join_all(open.into_iter().map(|order| async move {
            self.apply_escalation(&order.order_id, correlation_id, errors)
                .await;
        }))
        .await;
    }

    /// Final await after forced escalation: poll until terminal or the grace
    /// window closes.
    async fn await_forced(&self, order_ids: &[String], correlation_id: &str, errors: &ErrorMap) {
        let grace_deadline = tokio::time::Instant::now() + self.config.grace_window;

        loop {
            if self.all_terminal(order_ids) {
                return;
            }
            if tokio::time::Instant::now() >= grace_deadline {
                break;
            }

            let active = self.active_snapshots(order_ids);
            join_all(active.iter().map(|order| {
                self.poll_order(&order.order_id, correlation_id, errors)
            }))
            .await;

            if self.all_terminal(order_ids) {
                return;
            }
            let remaining = grace_deadline - tokio::time::Instant::now();
            tokio::time::sleep(self.config.tick_interval.min(remaining.max(Duration::ZERO))).await;
        }

        // Grace window closed with orders still open; record it rather than
        // dropping them.
        for order in self.active_snapshots(order_ids) {
            tracing::error!(
                correlation_id,
                order_id = %order.order_id,
                filled = %order.filled_qty,
                "order still open after grace window"
            );
            errors
                .lock()
                .entry(order.order_id)
                .or_insert_with(|| "order still open after phase deadline".to_string());
        }
    }

    /// Exactly one result per input order, preserving input order.
    fn assemble_results(&self, orders: &[TrackedOrder], errors: &ErrorMap) -> Vec<ExecutionResult> {
        let errors = errors.lock();
        orders
            .iter()
            .map(|initial| match self.tracker.snapshot(&initial.order_id) {
                Ok(order) => {
                    ExecutionResult::from_order(&order, errors.get(&order.order_id).cloned())
                }
                // The tracker never drops entries, so this only covers an id
                // that was never registered; the caller's own snapshot still
                // identifies the result.
                Err(err) => {
                    let mut result = ExecutionResult::from_order(initial, Some(err.to_string()));
                    result.status = OrderStatus::Failed;
                    result
                }
            })
            .collect()
    }

    fn active_snapshots(&self, order_ids: &[String]) -> Vec<TrackedOrder> {
        order_ids
            .iter()
            .filter_map(|order_id| self.tracker.snapshot(order_id).ok())
            .filter(|order| !order.is_terminal())
            .collect()
    }

    fn all_terminal(&self, order_ids: &[String]) -> bool {
        order_ids.iter().all(|order_id| {
            self.tracker
                .snapshot(order_id)
                .map_or(true, |order| order.is_terminal())
        })
    }

    fn fail_order(&self, order_id: &str, error: String, errors: &ErrorMap) {
        tracing::error!(order_id = %order_id, error = %error, "order failed");
        errors.lock().insert(order_id.to_string(), error);
        let _ = self.tracker.mark_status(order_id, OrderStatus::Failed);
    }
}
