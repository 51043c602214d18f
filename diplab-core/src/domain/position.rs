//! Open position with capital bookkeeping and trailing-stop state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Tolerance used for capital conservation checks.
pub const CAPITAL_EPSILON: f64 = 1e-6;

/// An open trade.
///
/// Capital identity, held at all times:
/// `initial_capital == remaining_exposed_capital + replenished_capital_cumulative`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub trade_id: u64,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub initial_capital: f64,
    pub remaining_exposed_capital: f64,
    pub replenished_capital_cumulative: f64,
    pub tsl_active: bool,
    pub peak_price: f64,
    pub signal_date: NaiveDate,
}

impl Position {
    pub fn open(
        trade_id: u64,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        capital: f64,
        signal_date: NaiveDate,
    ) -> Self {
        Self {
            trade_id,
            entry_time,
            entry_price,
            initial_capital: capital,
            remaining_exposed_capital: capital,
            replenished_capital_cumulative: 0.0,
            tsl_active: false,
            peak_price: entry_price,
            signal_date,
        }
    }

    /// Whole days elapsed since entry (truncated).
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_days()
    }

    /// Older than `max_hold_days` with capital still locked in it.
    pub fn is_stuck(&self, now: DateTime<Utc>, max_hold_days: u32) -> bool {
        self.age_days(now) > i64::from(max_hold_days) && self.remaining_exposed_capital > 0.0
    }

    /// Move up to `amount` of exposure back to the free pool.
    ///
    /// Returns the amount actually released (never more than the remaining exposure).
    pub fn release(&mut self, amount: f64) -> f64 {
        let reduction = amount.min(self.remaining_exposed_capital).max(0.0);
        self.remaining_exposed_capital -= reduction;
        self.replenished_capital_cumulative += reduction;
        reduction
    }

    /// Absolute deviation from the capital identity.
    pub fn conservation_error(&self) -> f64 {
        let accounted = self.remaining_exposed_capital + self.replenished_capital_cumulative;
        (self.initial_capital - accounted).abs()
    }

    pub fn is_conserved(&self) -> bool {
        self.conservation_error() <= CAPITAL_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Position {
        Position::open(
            1,
            Utc.with_ymd_and_hms(2024, 1, 2, 5, 0, 0).unwrap(),
            98.0,
            1_000.0,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    #[test]
    fn open_sets_full_exposure() {
        let pos = sample();
        assert_eq!(pos.remaining_exposed_capital, 1_000.0);
        assert_eq!(pos.replenished_capital_cumulative, 0.0);
        assert_eq!(pos.peak_price, 98.0);
        assert!(!pos.tsl_active);
        assert!(pos.is_conserved());
    }

    #[test]
    fn release_is_capped_by_exposure() {
        let mut pos = sample();
        assert_eq!(pos.release(300.0), 300.0);
        assert_eq!(pos.release(900.0), 700.0);
        assert_eq!(pos.release(50.0), 0.0);
        assert_eq!(pos.remaining_exposed_capital, 0.0);
        assert_eq!(pos.replenished_capital_cumulative, 1_000.0);
        assert!(pos.is_conserved());
    }

    #[test]
    fn stuck_requires_age_and_exposure() {
        let mut pos = sample();
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 4, 0, 0).unwrap();
        // 2 days 23 hours → 2 whole days
        assert_eq!(pos.age_days(now), 2);
        assert!(pos.is_stuck(now, 1));
        assert!(!pos.is_stuck(now, 2));

        pos.release(1_000.0);
        assert!(!pos.is_stuck(now, 1));
    }
}
