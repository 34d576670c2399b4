//! Broker error taxonomy.

/// Errors returned by broker adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Order was rejected by the broker.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Broker-supplied rejection reason.
        reason: String,
    },

    /// Account lacks buying power for the order.
    #[error("insufficient buying power: need {required}, have {available}")]
    InsufficientBuyingPower {
        /// Notional required for the order.
        required: String,
        /// Notional available on the account.
        available: String,
    },

    /// The referenced order does not exist at the broker.
    #[error("order not found: {order_id}")]
    OrderNotFound {
        /// Broker order id.
        order_id: String,
    },

    /// The broker did not respond within the allotted time.
    #[error("broker request timed out after {timeout_secs}s")]
    Timeout {
        /// Timeout that elapsed, in seconds.
        timeout_secs: u64,
    },

    /// The broker is throttling requests.
    #[error("rate limited by broker, retry after {retry_after_secs:?}s")]
    RateLimited {
        /// Suggested wait before retrying, if the broker provided one.
        retry_after_secs: Option<u64>,
    },

    /// Transport-level failure reaching the broker.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The circuit breaker is open and requests are being shed.
    #[error("broker circuit breaker is open")]
    CircuitOpen,

    /// Any other broker API error.
    #[error("broker api error: {0}")]
    Api(String),
}

impl BrokerError {
    /// Whether this error is worth retrying.
    ///
    /// Timeouts, throttling, and connection drops are transient; rejections
    /// and missing orders are not.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimited { .. } | Self::Connection(_)
        )
    }
}
