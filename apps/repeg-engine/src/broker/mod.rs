//! Broker adapters: trait, errors, retry decorator, and a test mock.

mod adapter;
mod error;
mod mock;
mod retry;

pub use adapter::{BrokerAdapter, OrderHandle, OrderSnapshot, OrderSpec};
pub use error::BrokerError;
pub use mock::{FillBehavior, MockBroker};
pub use retry::{CircuitBreaker, ExponentialBackoff, RetryPolicy, RetryingBroker};
