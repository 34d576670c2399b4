//! Per-run monitoring configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Phase;

/// Configuration errors.
///
/// These abort a phase before any order is placed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Unrecognized phase type string.
    #[error("invalid phase type: {0} (expected SELL or BUY)")]
    InvalidPhase(String),

    /// A required config value is missing or zero.
    #[error("invalid monitoring config: {key} {requirement}")]
    InvalidValue {
        /// Offending config key.
        key: &'static str,
        /// What the key must satisfy.
        requirement: &'static str,
    },
}

/// Immutable per-run configuration for the monitoring loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Phase this run executes (SELL or BUY).
    pub phase: Phase,
    /// How long an order may rest unfilled before it is considered for repeg.
    pub fill_wait: Duration,
    /// Post-deadline window for awaiting force-escalated orders.
    pub grace_window: Duration,
    /// Maximum number of reprices per order.
    pub max_repegs: u32,
    /// Multiplier applied to `fill_wait` after the final repeg, before
    /// escalation.
    pub extended_wait_multiplier: u32,
    /// Delay between monitoring ticks.
    pub tick_interval: Duration,
    /// Hard deadline for the whole phase.
    pub phase_deadline: Duration,
    /// Upper bound on each reprice step, in basis points of the mid price.
    pub repeg_step_bps: u32,
}

impl MonitoringConfig {
    /// Create a configuration with production defaults for the given phase.
    #[must_use]
    pub const fn new(phase: Phase) -> Self {
        Self {
            phase,
            fill_wait: Duration::from_secs(20),
            grace_window: Duration::from_secs(15),
            max_repegs: 3,
            extended_wait_multiplier: 2,
            tick_interval: Duration::from_secs(1),
            phase_deadline: Duration::from_secs(300),
            repeg_step_bps: 10,
        }
    }

    /// Copy this configuration for a different phase.
    #[must_use]
    pub const fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Grace window after the final repeg: `fill_wait` scaled by the
    /// extended-wait multiplier.
    #[must_use]
    pub fn extended_wait(&self) -> Duration {
        self.fill_wait * self.extended_wait_multiplier
    }

    /// Validate required keys; fails fast before any broker action.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fill_wait.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "fill_wait",
                requirement: "must be greater than zero",
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval",
                requirement: "must be greater than zero",
            });
        }
        if self.phase_deadline.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "phase_deadline",
                requirement: "must be greater than zero",
            });
        }
        if self.extended_wait_multiplier == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extended_wait_multiplier",
                requirement: "must be at least 1",
            });
        }
        if self.repeg_step_bps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "repeg_step_bps",
                requirement: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Parse a phase type string into a [`Phase`].
    pub fn parse_phase(value: &str) -> Result<Phase, ConfigError> {
        match value.to_ascii_uppercase().as_str() {
            "SELL" => Ok(Phase::Sell),
            "BUY" => Ok(Phase::Buy),
            other => Err(ConfigError::InvalidPhase(other.to_string())),
        }
    }
}
