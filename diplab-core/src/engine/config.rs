use crate::config::{check_fraction, check_non_negative, ConfigError};
use serde::{Deserialize, Serialize};

/// Parameters of the execution/capital simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Entry dip below the prior-day close, in [0, 1).
    pub dip_pct: f64,
    /// Rise over entry that arms the trailing stop, in [0, 1).
    pub tsl_trigger: f64,
    /// Trailing distance below the running peak, in [0, 1).
    pub tsl_distance: f64,
    /// Age in whole days past which an open position counts as stuck.
    /// Only used for replenishment; never forces an exit.
    pub max_hold_days: u32,
    pub initial_capital: f64,
    /// Upper bound of each monthly transfer from stuck positions to the free pool.
    pub monthly_dca_amount: f64,
    /// Optional iteration budget (hours) for a single run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dip_pct: 0.02,
            tsl_trigger: 0.05,
            tsl_distance: 0.03,
            max_hold_days: 90,
            initial_capital: 10_000.0,
            monthly_dca_amount: 1_000.0,
            max_steps: None,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("execution.dip_pct", self.dip_pct)?;
        check_fraction("execution.tsl_trigger", self.tsl_trigger)?;
        check_fraction("execution.tsl_distance", self.tsl_distance)?;
        if self.max_hold_days == 0 {
            return Err(ConfigError::Zero {
                field: "execution.max_hold_days",
            });
        }
        check_non_negative("execution.initial_capital", self.initial_capital)?;
        check_non_negative("execution.monthly_dca_amount", self.monthly_dca_amount)?;
        if self.max_steps == Some(0) {
            return Err(ConfigError::Zero {
                field: "execution.max_steps",
            });
        }
        Ok(())
    }
}
