//! Smart execution orchestrator.
//!
//! Per-phase facade over placement and monitoring. For each trade request it
//! chooses the initial order aggressiveness from the urgency hint, places the
//! order, registers it with a phase-scoped tracker, and then runs the repeg
//! monitoring loop once for the whole batch. A full rebalance executes the
//! SELL phase to completion before placing any BUY order, protecting buying
//! power.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerAdapter, OrderSpec};
use crate::config::{ConfigError, MonitoringConfig};
use crate::models::{ExecutionResult, Phase, TradeRequest, TrackedOrder};

use super::monitor::RepegMonitor;
use super::pricing::PricingConfig;
use super::tracker::OrderTracker;

/// Outcome of placing one request: either a monitored order or a final
/// failure result.
enum Placement {
    Monitored(TrackedOrder),
    Failed(ExecutionResult),
}

/// Facade that turns trade requests into execution results.
pub struct SmartExecutionOrchestrator {
    broker: Arc<dyn BrokerAdapter>,
    pricing: PricingConfig,
    config: MonitoringConfig,
    cancel: CancellationToken,
}

impl SmartExecutionOrchestrator {
    /// Create an orchestrator with default pricing offsets.
    #[must_use]
    pub fn new(broker: Arc<dyn BrokerAdapter>, config: MonitoringConfig) -> Self {
        Self::with_pricing(broker, config, PricingConfig::default())
    }

    /// Create an orchestrator with custom pricing offsets.
    #[must_use]
    pub fn with_pricing(
        broker: Arc<dyn BrokerAdapter>,
        config: MonitoringConfig,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            broker,
            pricing,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels in-flight monitoring when triggered.
    ///
    /// Cancellation force-escalates open orders rather than abandoning them.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute one phase's trade requests.
    ///
    /// Returns exactly one result per request, in input order, including
    /// requests whose placement failed. Only configuration errors abort the
    /// phase as a whole.
    pub async fn execute_phase(
        &self,
        requests: &[TradeRequest],
        correlation_id: &str,
    ) -> Result<Vec<ExecutionResult>, ConfigError> {
        self.config.validate()?;
        for request in requests {
            if !self.config.phase.matches_side(request.side) {
                tracing::warn!(
                    correlation_id,
                    symbol = %request.symbol,
                    side = %request.side,
                    phase = %self.config.phase,
                    "request side does not match the configured phase"
                );
            }
        }

        tracing::info!(
            correlation_id,
            phase = %self.config.phase,
            requests = requests.len(),
            broker = self.broker.broker_name(),
            "execution phase started"
        );

        // Tracker is scoped to this phase and dropped with it.
        let tracker = Arc::new(OrderTracker::new(self.config.max_repegs));

        let mut placements = Vec::with_capacity(requests.len());
        for request in requests {
            placements.push(self.place_request(request, &tracker).await);
        }

        let monitored: Vec<TrackedOrder> = placements
            .iter()
            .filter_map(|placement| match placement {
                Placement::Monitored(order) => Some(order.clone()),
                Placement::Failed(_) => None,
            })
            .collect();

        let monitor = RepegMonitor::new(
            Arc::clone(&self.broker),
            Arc::clone(&tracker),
            self.config.clone(),
            self.cancel.child_token(),
        );
        let monitored_results = monitor.run(&monitored, correlation_id).await?;
        let mut by_id: std::collections::HashMap<String, ExecutionResult> = monitored_results
            .into_iter()
            .filter_map(|result| result.order_id.clone().map(|id| (id, result)))
            .collect();

        let results = placements
            .into_iter()
            .zip(requests)
            .map(|(placement, request)| match placement {
                Placement::Failed(result) => result,
                Placement::Monitored(order) => by_id.remove(&order.order_id).unwrap_or_else(|| {
                    ExecutionResult::placement_failed(
                        request.symbol.clone(),
                        request.side,
                        request.quantity,
                        format!("no monitoring result for order {}", order.order_id),
                    )
                }),
            })
            .collect();

        tracing::info!(correlation_id, phase = %self.config.phase, "execution phase complete");
        Ok(results)
    }

    /// Execute a full rebalance: all SELLs resolve before any BUY is placed.
    ///
    /// Results come back in the original request order regardless of phase.
    pub async fn execute_rebalance(
        &self,
        requests: &[TradeRequest],
        correlation_id: &str,
    ) -> Result<Vec<ExecutionResult>, ConfigError> {
        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            if Phase::Sell.matches_side(request.side) {
                sells.push((index, request.clone()));
            } else {
                buys.push((index, request.clone()));
            }
        }

        let mut slots: Vec<Option<ExecutionResult>> = vec![None; requests.len()];

        for (phase, batch) in [(Phase::Sell, sells), (Phase::Buy, buys)] {
            if batch.is_empty() {
                continue;
            }
            let phased = Self {
                broker: Arc::clone(&self.broker),
                pricing: self.pricing.clone(),
                config: self.config.clone().with_phase(phase),
                cancel: self.cancel.clone(),
            };
            let batch_requests: Vec<TradeRequest> =
                batch.iter().map(|(_, request)| request.clone()).collect();
            let results = phased.execute_phase(&batch_requests, correlation_id).await?;
            for ((index, _), result) in batch.into_iter().zip(results) {
                slots[index] = Some(result);
            }
        }

        Ok(slots
            .into_iter()
            .zip(requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    ExecutionResult::placement_failed(
                        request.symbol.clone(),
                        request.side,
                        request.quantity,
                        "request was not executed",
                    )
                })
            })
            .collect())
    }

    /// Quote, price, place, and register one request.
    async fn place_request(&self, request: &TradeRequest, tracker: &OrderTracker) -> Placement {
        let quote = match self.broker.get_quote(&request.symbol).await {
            Ok(quote) => quote,
            Err(err) => {
                tracing::error!(
                    correlation_id = %request.correlation_id,
                    symbol = %request.symbol,
                    error = %err,
                    "quote unavailable, cannot price initial order"
                );
                return Placement::Failed(ExecutionResult::placement_failed(
                    request.symbol.clone(),
                    request.side,
                    request.quantity,
                    format!("quote unavailable: {err}"),
                ));
            }
        };

        let limit_price = self
            .pricing
            .initial_price(request.side, request.urgency, &quote);
        let spec = OrderSpec {
            // Idempotency key: a retried placement can never duplicate the
            // order at the broker.
            client_order_id: uuid::Uuid::new_v4().to_string(),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            limit_price: Some(limit_price),
        };

        let handle = match self.broker.place_order(&spec).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(
                    correlation_id = %request.correlation_id,
                    symbol = %request.symbol,
                    side = %request.side,
                    error = %err,
                    "initial placement failed"
                );
                return Placement::Failed(ExecutionResult::placement_failed(
                    request.symbol.clone(),
                    request.side,
                    request.quantity,
                    err.to_string(),
                ));
            }
        };

        tracing::info!(
            correlation_id = %request.correlation_id,
            order_id = %handle.order_id,
            symbol = %request.symbol,
            side = %request.side,
            urgency = ?request.urgency,
            limit_price = %limit_price,
            "initial order placed"
        );

        let order = TrackedOrder::new(
            handle.order_id.clone(),
            request.symbol.clone(),
            request.side,
            request.quantity,
            Some(limit_price),
            request.correlation_id.clone(),
            request.causation_id.clone(),
        );
        let placed = order.clone();
        match tracker.register(order) {
            Ok(()) => Placement::Monitored(placed),
            Err(err) => {
                tracing::error!(
                    correlation_id = %request.correlation_id,
                    order_id = %handle.order_id,
                    error = %err,
                    "registration failed for placed order"
                );
                Placement::Failed(ExecutionResult::placement_failed(
                    request.symbol.clone(),
                    request.side,
                    request.quantity,
                    err.to_string(),
                ))
            }
        }
    }
}
