//! A closed trade: the position snapshot at its trailing-stop exit.

use super::position::{Position, CAPITAL_EPSILON};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A completed trade. Immutable once appended to the output list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: u64,
    pub signal_date: NaiveDate,

    // ── Entry ──
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,

    // ── Capital ──
    pub initial_capital: f64,
    pub remaining_exposed_capital: f64,
    pub replenished_capital_cumulative: f64,
    /// Capital returned to the free pool at exit.
    pub payout: f64,

    // ── Trailing stop ──
    pub tsl_active: bool,
    pub peak_price: f64,
}

impl ClosedTrade {
    pub fn from_position(
        position: Position,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        payout: f64,
    ) -> Self {
        Self {
            trade_id: position.trade_id,
            signal_date: position.signal_date,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_time,
            exit_price,
            initial_capital: position.initial_capital,
            remaining_exposed_capital: position.remaining_exposed_capital,
            replenished_capital_cumulative: position.replenished_capital_cumulative,
            payout,
            tsl_active: position.tsl_active,
            peak_price: position.peak_price,
        }
    }

    /// Price return of the trade: `exit / entry - 1`.
    pub fn return_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.exit_price / self.entry_price - 1.0
    }

    pub fn is_winner(&self) -> bool {
        self.exit_price > self.entry_price
    }

    pub fn was_replenished(&self) -> bool {
        self.replenished_capital_cumulative > CAPITAL_EPSILON
    }

    pub fn conservation_error(&self) -> f64 {
        let accounted = self.remaining_exposed_capital + self.replenished_capital_cumulative;
        (self.initial_capital - accounted).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade() -> ClosedTrade {
        let mut pos = Position::open(
            7,
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap(),
            100.0,
            1_000.0,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        pos.release(200.0);
        pos.tsl_active = true;
        pos.peak_price = 110.0;
        ClosedTrade::from_position(
            pos,
            Utc.with_ymd_and_hms(2024, 1, 9, 14, 0, 0).unwrap(),
            106.7,
            800.0 * 1.067,
        )
    }

    #[test]
    fn snapshot_keeps_capital_fields() {
        let trade = sample_trade();
        assert_eq!(trade.trade_id, 7);
        assert_eq!(trade.initial_capital, 1_000.0);
        assert_eq!(trade.remaining_exposed_capital, 800.0);
        assert_eq!(trade.replenished_capital_cumulative, 200.0);
        assert!(trade.conservation_error() < CAPITAL_EPSILON);
        assert!(trade.was_replenished());
    }

    #[test]
    fn return_pct_calculation() {
        let trade = sample_trade();
        assert!((trade.return_pct() - 0.067).abs() < 1e-10);
        assert!(trade.is_winner());
    }
}
