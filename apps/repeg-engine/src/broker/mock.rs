//! Mock broker adapter for testing.
//!
//! This mock returns simulated responses without making actual API calls.
//! Fill behavior is scripted per symbol so tests can drive the repeg loop
//! through specific paths: orders that never fill, fill after a number of
//! status polls, or fill only once they have been repriced enough times.
//! Order IDs are generated sequentially starting from 1.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::adapter::{BrokerAdapter, OrderHandle, OrderSnapshot, OrderSpec};
use super::error::BrokerError;
use crate::models::Quote;

/// Scripted fill behavior for orders on a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillBehavior {
    /// The order never fills on its own (default).
    NeverFill,
    /// The order fully fills after this many status polls.
    FillAfterPolls(u32),
    /// The order fully fills on the poll after this many replaces.
    FillAfterReplaces(u32),
    /// Placement is rejected outright.
    RejectPlacement,
    /// Replace requests fail with a rejection.
    FailReplace,
    /// The order fully fills at the moment a replace is attempted, and the
    /// replace is rejected because of it.
    FillRacesReplace,
}

#[derive(Debug, Clone)]
struct MockOrder {
    client_order_id: String,
    symbol: String,
    quantity: Decimal,
    limit_price: Option<Decimal>,
    filled_qty: Decimal,
    polls: u32,
    replaces: u32,
    escalated: bool,
    cancelled: bool,
    replace_history: Vec<Option<Decimal>>,
}

impl MockOrder {
    fn is_filled(&self) -> bool {
        self.filled_qty >= self.quantity
    }

    fn is_terminal(&self) -> bool {
        self.is_filled() || self.cancelled
    }

    fn fill_price(&self, quote: Option<&Quote>) -> Decimal {
        self.limit_price
            .or_else(|| quote.map(Quote::mid))
            .unwrap_or(Decimal::ONE_HUNDRED)
    }
}

/// Mock broker adapter with scripted per-symbol fill behavior.
#[derive(Debug, Default)]
pub struct MockBroker {
    order_counter: AtomicU64,
    orders: Mutex<HashMap<String, MockOrder>>,
    quotes: Mutex<HashMap<String, Quote>>,
    behaviors: Mutex<HashMap<String, FillBehavior>>,
}

impl MockBroker {
    /// Create a new mock broker with no quotes and default behavior.
    #[must_use]
    pub fn new() -> Self {
        Self {
            order_counter: AtomicU64::new(1),
            orders: Mutex::new(HashMap::new()),
            quotes: Mutex::new(HashMap::new()),
            behaviors: Mutex::new(HashMap::new()),
        }
    }

    /// Set the quote returned for a symbol.
    pub fn set_quote(&self, quote: Quote) {
        self.quotes.lock().insert(quote.symbol.clone(), quote);
    }

    /// Script the fill behavior for a symbol's orders.
    pub fn set_behavior(&self, symbol: &str, behavior: FillBehavior) {
        self.behaviors.lock().insert(symbol.to_string(), behavior);
    }

    fn behavior_for(&self, symbol: &str) -> FillBehavior {
        self.behaviors
            .lock()
            .get(symbol)
            .copied()
            .unwrap_or(FillBehavior::NeverFill)
    }

    /// Limit prices submitted through `replace_order` for an order, in call
    /// order. `None` entries are market conversions.
    #[must_use]
    pub fn replace_history(&self, order_id: &str) -> Vec<Option<Decimal>> {
        self.orders
            .lock()
            .get(order_id)
            .map(|order| order.replace_history.clone())
            .unwrap_or_default()
    }

    /// Whether an order was cancelled.
    #[must_use]
    pub fn was_cancelled(&self, order_id: &str) -> bool {
        self.orders
            .lock()
            .get(order_id)
            .is_some_and(|order| order.cancelled)
    }

    /// Number of orders placed so far.
    #[must_use]
    pub fn placed_count(&self) -> usize {
        self.orders.lock().len()
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn place_order(&self, spec: &OrderSpec) -> Result<OrderHandle, BrokerError> {
        if self.behavior_for(&spec.symbol) == FillBehavior::RejectPlacement {
            return Err(BrokerError::OrderRejected {
                reason: format!("placement rejected for {}", spec.symbol),
            });
        }

        let mut orders = self.orders.lock();

        // Idempotent on the client order id: resubmission returns the
        // original order instead of creating a second one.
        if let Some((order_id, _)) = orders
            .iter()
            .find(|(_, order)| order.client_order_id == spec.client_order_id)
        {
            return Ok(OrderHandle {
                order_id: order_id.clone(),
                accepted_at: chrono::Utc::now(),
            });
        }

        let seq = self.order_counter.fetch_add(1, Ordering::SeqCst);
        let order_id = format!("mock-{seq}");

        orders.insert(
            order_id.clone(),
            MockOrder {
                client_order_id: spec.client_order_id.clone(),
                symbol: spec.symbol.clone(),
                quantity: spec.quantity,
                limit_price: spec.limit_price,
                filled_qty: Decimal::ZERO,
                polls: 0,
                replaces: 0,
                escalated: spec.limit_price.is_none(),
                cancelled: false,
                replace_history: Vec::new(),
            },
        );

        Ok(OrderHandle {
            order_id,
            accepted_at: chrono::Utc::now(),
        })
    }

    async fn replace_order(
        &self,
        order_id: &str,
        new_limit: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;

        if self.behavior_for(&order.symbol) == FillBehavior::FailReplace {
            return Err(BrokerError::OrderRejected {
                reason: format!("replace rejected for {}", order.symbol),
            });
        }
        if self.behavior_for(&order.symbol) == FillBehavior::FillRacesReplace {
            order.filled_qty = order.quantity;
            return Err(BrokerError::OrderRejected {
                reason: format!("order already filled for {}", order.symbol),
            });
        }
        if order.is_terminal() {
            return Err(BrokerError::OrderRejected {
                reason: "order already terminal".to_string(),
            });
        }

        order.replaces += 1;
        order.replace_history.push(new_limit);
        order.limit_price = new_limit;
        if new_limit.is_none() {
            order.escalated = true;
        }
        Ok(())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BrokerError> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;
        order.cancelled = true;
        Ok(())
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        self.quotes
            .lock()
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::Api(format!("no quote available for {symbol}")))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderSnapshot, BrokerError> {
        let quotes = self.quotes.lock();
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::OrderNotFound {
                order_id: order_id.to_string(),
            })?;

        order.polls += 1;

        if !order.is_terminal() {
            // Escalated (market) orders fill on the next poll; otherwise the
            // scripted behavior decides.
            let should_fill = order.escalated
                || match self.behavior_for(&order.symbol) {
                    FillBehavior::FillAfterPolls(n) => order.polls > n,
                    FillBehavior::FillAfterReplaces(n) => order.replaces >= n,
                    _ => false,
                };
            if should_fill {
                order.filled_qty = order.quantity;
            }
        }

        let avg_fill_price = if order.filled_qty > Decimal::ZERO {
            Some(order.fill_price(quotes.get(&order.symbol)))
        } else {
            None
        };

        Ok(OrderSnapshot {
            order_id: order_id.to_string(),
            filled_qty: order.filled_qty,
            avg_fill_price,
            limit_price: order.limit_price,
            is_terminal: order.is_terminal(),
            is_filled: order.is_filled(),
        })
    }

    fn broker_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::OrderSide;

    fn spec(symbol: &str, limit: Option<Decimal>) -> OrderSpec {
        OrderSpec {
            client_order_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: dec!(100),
            limit_price: limit,
        }
    }

    #[tokio::test]
    async fn sequential_order_ids() {
        let broker = MockBroker::new();
        let first = broker.place_order(&spec("AAPL", Some(dec!(150)))).await;
        let second = broker.place_order(&spec("AAPL", Some(dec!(150)))).await;
        assert_eq!(first.unwrap().order_id, "mock-1");
        assert_eq!(second.unwrap().order_id, "mock-2");
    }

    #[tokio::test]
    async fn never_fill_stays_open() {
        let broker = MockBroker::new();
        let handle = broker
            .place_order(&spec("AAPL", Some(dec!(150))))
            .await
            .unwrap();

        for _ in 0..5 {
            let snapshot = broker.get_order_status(&handle.order_id).await.unwrap();
            assert!(!snapshot.is_filled);
            assert!(!snapshot.is_terminal);
        }
    }

    #[tokio::test]
    async fn fill_after_polls() {
        let broker = MockBroker::new();
        broker.set_behavior("AAPL", FillBehavior::FillAfterPolls(2));
        let handle = broker
            .place_order(&spec("AAPL", Some(dec!(150))))
            .await
            .unwrap();

        assert!(!broker.get_order_status(&handle.order_id).await.unwrap().is_filled);
        assert!(!broker.get_order_status(&handle.order_id).await.unwrap().is_filled);
        let snapshot = broker.get_order_status(&handle.order_id).await.unwrap();
        assert!(snapshot.is_filled);
        assert_eq!(snapshot.filled_qty, dec!(100));
        assert_eq!(snapshot.avg_fill_price, Some(dec!(150)));
    }

    #[tokio::test]
    async fn market_conversion_fills_on_next_poll() {
        let broker = MockBroker::new();
        broker.set_quote(Quote::new(
            "AAPL",
            dec!(149.90),
            dec!(150.10),
            dec!(500),
            dec!(500),
        ));
        let handle = broker
            .place_order(&spec("AAPL", Some(dec!(149.95))))
            .await
            .unwrap();

        broker.replace_order(&handle.order_id, None).await.unwrap();
        let snapshot = broker.get_order_status(&handle.order_id).await.unwrap();
        assert!(snapshot.is_filled);
        // Market order fills at the quote mid.
        assert_eq!(snapshot.avg_fill_price, Some(dec!(150.00)));
    }

    #[tokio::test]
    async fn rejected_placement() {
        let broker = MockBroker::new();
        broker.set_behavior("HALT", FillBehavior::RejectPlacement);
        let err = broker
            .place_order(&spec("HALT", Some(dec!(10))))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::OrderRejected { .. }));
        assert_eq!(broker.placed_count(), 0);
    }

    #[tokio::test]
    async fn replace_tracks_history() {
        let broker = MockBroker::new();
        let handle = broker
            .place_order(&spec("AAPL", Some(dec!(150))))
            .await
            .unwrap();

        broker
            .replace_order(&handle.order_id, Some(dec!(150.05)))
            .await
            .unwrap();
        broker.replace_order(&handle.order_id, None).await.unwrap();

        assert_eq!(
            broker.replace_history(&handle.order_id),
            vec![Some(dec!(150.05)), None]
        );
    }

    #[tokio::test]
    async fn cancelled_order_is_terminal_and_rejects_replaces() {
        let broker = MockBroker::new();
        let handle = broker
            .place_order(&spec("AAPL", Some(dec!(150))))
            .await
            .unwrap();

        broker.cancel_order(&handle.order_id).await.unwrap();
        assert!(broker.was_cancelled(&handle.order_id));

        let snapshot = broker.get_order_status(&handle.order_id).await.unwrap();
        assert!(snapshot.is_terminal);
        assert!(!snapshot.is_filled);

        let err = broker
            .replace_order(&handle.order_id, Some(dec!(150.05)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::OrderRejected { .. }));
    }

    #[tokio::test]
    async fn resubmitted_spec_is_idempotent() {
        let broker = MockBroker::new();
        let spec = spec("AAPL", Some(dec!(150)));

        let first = broker.place_order(&spec).await.unwrap();
        let second = broker.place_order(&spec).await.unwrap();
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(broker.placed_count(), 1);
    }

    #[tokio::test]
    async fn unknown_symbol_quote_fails() {
        let broker = MockBroker::new();
        assert!(broker.get_quote("ZZZZ").await.is_err());
    }
}
