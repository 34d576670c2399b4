//! End-to-end tests driving the orchestrator and monitoring loop against the
//! scripted mock broker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal_macros::dec;

use repeg_engine::broker::{BrokerAdapter, FillBehavior, MockBroker};
use repeg_engine::{
    MonitoringConfig, OrderSide, OrderStatus, Phase, Quote, SmartExecutionOrchestrator,
    TradeRequest, Urgency,
};

/// Millisecond-scale config so tests run in real time without long sleeps.
fn fast_config(phase: Phase) -> MonitoringConfig {
    let mut config = MonitoringConfig::new(phase);
    config.fill_wait = Duration::from_millis(30);
    config.grace_window = Duration::from_millis(400);
    config.max_repegs = 3;
    config.extended_wait_multiplier = 2;
    config.tick_interval = Duration::from_millis(10);
    config.phase_deadline = Duration::from_secs(3);
    config.repeg_step_bps = 10;
    config
}

/// Wide quote so repegs step toward the touch without reaching it.
fn wide_quote(symbol: &str) -> Quote {
    Quote::new(symbol, dec!(100.00), dec!(101.00), dec!(500), dec!(500))
}

fn buy(symbol: &str, qty: rust_decimal::Decimal) -> TradeRequest {
    TradeRequest::new(symbol, OrderSide::Buy, qty, Urgency::Normal, "corr-1", "cause-1")
}

fn sell(symbol: &str, qty: rust_decimal::Decimal) -> TradeRequest {
    TradeRequest::new(symbol, OrderSide::Sell, qty, Urgency::Normal, "corr-1", "cause-1")
}

#[tokio::test]
async fn never_filled_buy_repegs_to_budget_then_escalates() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Buy),
    );

    let results = orchestrator
        .execute_phase(&[buy("AAPL", dec!(100))], "corr-1")
        .await
        .expect("phase should run");

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.repeg_count, 3);
    assert!(result.escalated);
    // The forced market order fills during monitoring.
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.filled_qty, dec!(100));
    assert!(result.error.is_none());

    // Three reprices stepping toward the ask, then the market conversion.
    let order_id = result.order_id.as_deref().expect("order was placed");
    let history = broker.replace_history(order_id);
    assert_eq!(history.len(), 4);
    assert_eq!(history[3], None);
    let prices: Vec<_> = history[..3].iter().map(|p| p.expect("limit reprice")).collect();
    assert!(prices.windows(2).all(|w| w[1] > w[0]), "prices climb: {prices:?}");
    assert!(prices.iter().all(|p| *p < dec!(101.00)), "never past the ask");
}

#[tokio::test]
async fn mixed_batch_resolves_concurrently_in_input_order() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));
    broker.set_quote(wide_quote("MSFT"));
    broker.set_behavior("AAPL", FillBehavior::FillAfterPolls(0));
    broker.set_behavior("MSFT", FillBehavior::FillAfterReplaces(2));

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Sell),
    );

    let started = Instant::now();
    let results = orchestrator
        .execute_phase(&[sell("AAPL", dec!(10)), buy("MSFT", dec!(5))], "corr-1")
        .await
        .expect("phase should run");
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].symbol, "AAPL");
    assert_eq!(results[1].symbol, "MSFT");

    assert_eq!(results[0].status, OrderStatus::Filled);
    assert_eq!(results[0].repeg_count, 0);
    assert_eq!(results[0].filled_qty, dec!(10));

    assert_eq!(results[1].status, OrderStatus::Filled);
    assert_eq!(results[1].repeg_count, 2);
    assert!(!results[1].escalated);
    assert_eq!(results[1].filled_qty, dec!(5));

    // AAPL's immediate fill must not serialize ahead of MSFT's repegs.
    assert!(elapsed < Duration::from_secs(1), "phase took {elapsed:?}");
}

#[tokio::test]
async fn rejected_placement_does_not_disturb_siblings() {
    let broker = Arc::new(MockBroker::new());
    for symbol in ["AAPL", "HALT", "MSFT"] {
        broker.set_quote(wide_quote(symbol));
    }
    broker.set_behavior("AAPL", FillBehavior::FillAfterPolls(0));
    broker.set_behavior("MSFT", FillBehavior::FillAfterPolls(0));
    broker.set_behavior("HALT", FillBehavior::RejectPlacement);

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Buy),
    );

    let results = orchestrator
        .execute_phase(
            &[buy("AAPL", dec!(10)), buy("HALT", dec!(20)), buy("MSFT", dec!(30))],
            "corr-1",
        )
        .await
        .expect("phase should run");

    assert_eq!(results.len(), 3);
    assert_eq!(
        results.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(),
        ["AAPL", "HALT", "MSFT"]
    );

    let rejected = &results[1];
    assert_eq!(rejected.status, OrderStatus::Rejected);
    assert_eq!(rejected.filled_qty, dec!(0));
    assert!(rejected.order_id.is_none());
    assert!(rejected.error.as_deref().is_some_and(|e| e.contains("rejected")));

    assert!(results[0].is_complete_fill());
    assert!(results[2].is_complete_fill());
}

#[tokio::test]
async fn fill_racing_a_replace_is_reported_as_filled() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));
    // The order fills at the broker in the instant the first reprice is
    // attempted, so the replace bounces.
    broker.set_behavior("AAPL", FillBehavior::FillRacesReplace);

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Buy),
    );

    let results = orchestrator
        .execute_phase(&[buy("AAPL", dec!(100))], "corr-1")
        .await
        .expect("phase should run");

    // The rejected replace must not shadow the fill.
    let result = &results[0];
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.filled_qty, dec!(100));
    assert!(result.error.is_none());
    assert_eq!(result.repeg_count, 0);
    assert!(!result.escalated);
}

#[tokio::test]
async fn failed_escalation_is_recorded_without_disturbing_siblings() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));
    broker.set_quote(wide_quote("MSFT"));
    broker.set_behavior("AAPL", FillBehavior::FillAfterPolls(0));
    broker.set_behavior("MSFT", FillBehavior::FailReplace);

    let mut config = fast_config(Phase::Buy);
    // Deadline lands inside the first hold window, so the forced market
    // conversion is the first replace the broker sees.
    config.fill_wait = Duration::from_millis(500);
    config.phase_deadline = Duration::from_millis(80);

    let orchestrator =
        SmartExecutionOrchestrator::new(Arc::clone(&broker) as Arc<dyn BrokerAdapter>, config);

    let results = orchestrator
        .execute_phase(&[buy("AAPL", dec!(10)), buy("MSFT", dec!(20))], "corr-1")
        .await
        .expect("phase should run");

    assert_eq!(results.len(), 2);
    assert!(results[0].is_complete_fill());

    let failed = &results[1];
    assert_eq!(failed.status, OrderStatus::Failed);
    assert!(!failed.escalated);
    assert_eq!(failed.filled_qty, dec!(0));
    assert!(
        failed
            .error
            .as_deref()
            .is_some_and(|e| e.contains("escalation failed"))
    );
}

#[tokio::test]
async fn deadline_forces_escalation_of_held_orders() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));

    let mut config = fast_config(Phase::Buy);
    // Fill-wait longer than the deadline: the order is still in HOLD when
    // time runs out.
    config.fill_wait = Duration::from_millis(500);
    config.phase_deadline = Duration::from_millis(80);

    let orchestrator =
        SmartExecutionOrchestrator::new(Arc::clone(&broker) as Arc<dyn BrokerAdapter>, config);

    let results = orchestrator
        .execute_phase(&[buy("AAPL", dec!(100))], "corr-1")
        .await
        .expect("phase should run");

    let result = &results[0];
    assert!(result.escalated);
    assert_eq!(result.repeg_count, 0);
    assert_eq!(result.status, OrderStatus::Filled);
    assert_eq!(result.filled_qty, dec!(100));

    let order_id = result.order_id.as_deref().expect("order was placed");
    assert_eq!(broker.replace_history(order_id), vec![None]);
}

#[tokio::test]
async fn cancellation_escalates_and_still_returns_results() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));

    let mut config = fast_config(Phase::Buy);
    config.fill_wait = Duration::from_millis(500);
    config.phase_deadline = Duration::from_secs(10);

    let orchestrator = Arc::new(SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        config,
    ));
    let token = orchestrator.cancellation_token();

    let task = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            orchestrator
                .execute_phase(&[buy("AAPL", dec!(100))], "corr-1")
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let results = task
        .await
        .expect("task completes")
        .expect("phase should run");
    assert_eq!(results.len(), 1);
    assert!(results[0].escalated);
    assert_eq!(results[0].status, OrderStatus::Filled);
}

#[tokio::test]
async fn rebalance_resolves_sells_before_placing_buys() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));
    broker.set_quote(wide_quote("MSFT"));
    broker.set_behavior("AAPL", FillBehavior::FillAfterPolls(0));
    broker.set_behavior("MSFT", FillBehavior::FillAfterPolls(0));

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Sell),
    );

    // BUY listed first, but the SELL must hit the broker first.
    let results = orchestrator
        .execute_rebalance(&[buy("MSFT", dec!(5)), sell("AAPL", dec!(10))], "corr-1")
        .await
        .expect("rebalance should run");

    assert_eq!(results.len(), 2);
    // Input order preserved in the result list.
    assert_eq!(results[0].symbol, "MSFT");
    assert_eq!(results[1].symbol, "AAPL");
    assert!(results.iter().all(|r| r.is_complete_fill()));

    // Mock ids are sequential, so the SELL carrying the first id proves it
    // was placed before the BUY.
    assert_eq!(results[1].order_id.as_deref(), Some("mock-1"));
    assert_eq!(results[0].order_id.as_deref(), Some("mock-2"));
}

#[tokio::test]
async fn invalid_config_fails_before_any_placement() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));

    let mut config = fast_config(Phase::Buy);
    config.tick_interval = Duration::ZERO;

    let orchestrator =
        SmartExecutionOrchestrator::new(Arc::clone(&broker) as Arc<dyn BrokerAdapter>, config);

    let outcome = orchestrator
        .execute_phase(&[buy("AAPL", dec!(100))], "corr-1")
        .await;

    assert!(outcome.is_err());
    assert_eq!(broker.placed_count(), 0);
}

#[tokio::test]
async fn missing_quote_yields_errored_result() {
    let broker = Arc::new(MockBroker::new());
    // No quote registered for the symbol.

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Buy),
    );

    let results = orchestrator
        .execute_phase(&[buy("NOPE", dec!(100))], "corr-1")
        .await
        .expect("phase should run");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filled_qty, dec!(0));
    assert!(results[0].order_id.is_none());
    assert!(
        results[0]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("quote unavailable"))
    );
}

#[tokio::test]
async fn high_urgency_crosses_the_spread_at_placement() {
    let broker = Arc::new(MockBroker::new());
    broker.set_quote(wide_quote("AAPL"));
    broker.set_behavior("AAPL", FillBehavior::FillAfterPolls(0));

    let orchestrator = SmartExecutionOrchestrator::new(
        Arc::clone(&broker) as Arc<dyn BrokerAdapter>,
        fast_config(Phase::Buy),
    );

    let request = TradeRequest::new(
        "AAPL",
        OrderSide::Buy,
        dec!(10),
        Urgency::High,
        "corr-1",
        "cause-1",
    );
    let results = orchestrator
        .execute_phase(&[request], "corr-1")
        .await
        .expect("phase should run");

    // Marketable limit clears the ask, so the fill lands at the limit.
    assert!(results[0].is_complete_fill());
    assert!(results[0].avg_fill_price >= dec!(101.00));
}
