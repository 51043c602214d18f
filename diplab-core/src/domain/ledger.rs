use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the hourly capital ledger. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub timestamp: DateTime<Utc>,
    pub free_capital: f64,
    pub active_trades_count: usize,
    pub total_exposure: f64,
}

impl LedgerRow {
    /// Free pool plus capital locked in open positions.
    pub fn equity(&self) -> f64 {
        self.free_capital + self.total_exposure
    }
}
