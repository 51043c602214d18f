//! Run metrics — pure functions over the ledger and the trades table.
//!
//! Equity here is `free_capital + total_exposure`. Exposure is carried at
//! cost, so equity only moves when a trade exits.

use chrono::{DateTime, Utc};
use diplab_core::domain::{ClosedTrade, LedgerRow, Position, CAPITAL_EPSILON};
use diplab_core::engine::ExecutionResult;
use serde::{Deserialize, Serialize};

/// Aggregate statistics for a single execution run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub final_equity: f64,
    pub max_exposure: f64,
    pub trade_count: usize,
    pub open_positions_at_end: usize,
    pub win_rate: f64,
    pub mean_return: f64,
    pub total_replenished: f64,
    pub replenished_trades: usize,
    /// Negative fraction, e.g. -0.15 for a 15% drawdown.
    pub max_drawdown: f64,
    /// Share of hours with capital deployed.
    pub utilisation: f64,
}

impl RunMetrics {
    pub fn compute(result: &ExecutionResult) -> Self {
        let equity: Vec<f64> = result.ledger.iter().map(LedgerRow::equity).collect();
        Self {
            final_equity: equity.last().copied().unwrap_or(0.0),
            max_exposure: max_exposure(&result.ledger),
            trade_count: result.trades.len(),
            open_positions_at_end: result.open_positions.len(),
            win_rate: win_rate(&result.trades),
            mean_return: mean_return(&result.trades),
            total_replenished: result.stats.total_injected,
            replenished_trades: result.trades.iter().filter(|t| t.was_replenished()).count()
                + result
                    .open_positions
                    .iter()
                    .filter(|p| p.replenished_capital_cumulative > CAPITAL_EPSILON)
                    .count(),
            max_drawdown: max_drawdown(&equity),
            utilisation: utilisation(&result.ledger),
        }
    }
}

/// Risk profile of one run, compared across market regimes and stress
/// scenarios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub total_trades: usize,
    /// Mean holding time of closed trades.
    pub avg_duration_hours: f64,
    pub max_drawdown: f64,
    /// Longest stretch of ledger hours spent below the running equity peak.
    pub max_dd_duration_hours: usize,
    /// Percent of positions, closed or still open, held past `max_hold_days`.
    pub stuck_pct: f64,
    /// Mean hourly share of equity locked in positions.
    pub capital_utilization_mean: f64,
    /// Percent of closed trades that exited below entry.
    pub negative_pnl_pct: f64,
}

impl PeriodMetrics {
    pub fn compute(result: &ExecutionResult, max_hold_days: u32) -> Self {
        let equity: Vec<f64> = result.ledger.iter().map(LedgerRow::equity).collect();
        let end = result.ledger.last().map(|r| r.timestamp);
        Self {
            total_trades: result.trades.len(),
            avg_duration_hours: avg_duration_hours(&result.trades),
            max_drawdown: max_drawdown(&equity),
            max_dd_duration_hours: max_drawdown_duration(&equity),
            stuck_pct: stuck_pct(&result.trades, &result.open_positions, end, max_hold_days),
            capital_utilization_mean: capital_utilization_mean(&result.ledger),
            negative_pnl_pct: negative_pnl_pct(&result.trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

pub fn max_exposure(ledger: &[LedgerRow]) -> f64 {
    ledger.iter().map(|r| r.total_exposure).fold(0.0, f64::max)
}

/// Fraction of closed trades that exited above entry.
pub fn win_rate(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

pub fn mean_return(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(ClosedTrade::return_pct).sum::<f64>() / trades.len() as f64
}

/// Maximum drawdown of an equity series. 0.0 when it never falls.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

pub fn utilisation(ledger: &[LedgerRow]) -> f64 {
    if ledger.is_empty() {
        return 0.0;
    }
    let deployed = ledger
        .iter()
        .filter(|r| r.total_exposure > CAPITAL_EPSILON)
        .count();
    deployed as f64 / ledger.len() as f64
}

pub fn avg_duration_hours(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let minutes: i64 = trades
        .iter()
        .map(|t| (t.exit_time - t.entry_time).num_minutes())
        .sum();
    minutes as f64 / 60.0 / trades.len() as f64
}

/// Longest run of consecutive points below the running peak.
pub fn max_drawdown_duration(equity: &[f64]) -> usize {
    let mut peak = f64::NEG_INFINITY;
    let mut run = 0;
    let mut longest = 0;
    for &eq in equity {
        if eq < peak - CAPITAL_EPSILON {
            run += 1;
            longest = longest.max(run);
        } else {
            peak = peak.max(eq);
            run = 0;
        }
    }
    longest
}

/// Closed trades are aged at exit, open positions at `end`.
pub fn stuck_pct(
    trades: &[ClosedTrade],
    open: &[Position],
    end: Option<DateTime<Utc>>,
    max_hold_days: u32,
) -> f64 {
    let total = trades.len() + open.len();
    if total == 0 {
        return 0.0;
    }
    let limit = i64::from(max_hold_days);
    let closed = trades
        .iter()
        .filter(|t| (t.exit_time - t.entry_time).num_days() > limit)
        .count();
    let still_open = end.map_or(0, |end| open.iter().filter(|p| p.age_days(end) > limit).count());
    100.0 * (closed + still_open) as f64 / total as f64
}

pub fn capital_utilization_mean(ledger: &[LedgerRow]) -> f64 {
    if ledger.is_empty() {
        return 0.0;
    }
    let total: f64 = ledger
        .iter()
        .map(|r| {
            let equity = r.equity();
            if equity > CAPITAL_EPSILON {
                r.total_exposure / equity
            } else {
                0.0
            }
        })
        .sum();
    total / ledger.len() as f64
}

pub fn negative_pnl_pct(trades: &[ClosedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let losers = trades.iter().filter(|t| t.return_pct() < 0.0).count();
    100.0 * losers as f64 / trades.len() as f64
}
