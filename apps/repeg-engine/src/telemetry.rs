//! Tracing setup.
//!
//! Console logging with an env-filter; `RUST_LOG` controls verbosity and
//! defaults to `info`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use repeg_engine::telemetry::init_telemetry;
//!
//! #[tokio::main]
//! async fn main() {
//!     init_telemetry();
//!     // ... application code
//! }
//! ```

use tracing_subscriber::EnvFilter;

/// Initialize console tracing.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_telemetry() {
    let is_development = std::env::var("NODE_ENV")
        .map(|v| v == "development")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(!is_development)
        .with_ansi(is_development)
        .init();
}
