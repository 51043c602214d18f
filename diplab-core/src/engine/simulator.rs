//! Execution and capital simulator: a single-pass walk over hourly candles.
//!
//! Four phases per candle, in this order:
//! 1. Monthly replenishment: on a calendar-month change, move up to
//!    `monthly_dca_amount` of exposure from stuck positions to the free pool.
//! 2. Exits: trailing-stop arming, peak tracking and breach for every open
//!    position. A position can arm and breach on the same candle.
//! 3. Entry: if yesterday is a permitted, unconsumed signal and free capital
//!    is positive, a dip below the prior-day close opens a position with the
//!    entire free pool.
//! 4. Ledger: one row with the post-transition capital state.
//!
//! Capital only moves between the free pool and open positions, except at
//! exits where the realized return is applied. Invariant violations never
//! abort the run; they are for the audit to report.

use super::config::ExecutionConfig;
use super::control::RunControl;
use crate::config::ConfigError;
use crate::data::{validate_candles, CandleError};
use crate::domain::{
    Candle, ClosedTrade, DailyPermission, LedgerRow, PermissionError, PermissionMap, Position,
};
use crate::entry::dip_fill;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum ExecutionError {
    #[error("invalid input candles: {0}")]
    Candles(#[from] CandleError),

    #[error("invalid execution config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid permissions: {0}")]
    Permissions(#[from] PermissionError),

    #[error("run cancelled at step {step}")]
    Cancelled { step: usize },

    #[error("iteration budget of {budget} steps exhausted")]
    BudgetExhausted { budget: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub candles_processed: usize,
    pub entries: usize,
    pub exits: usize,
    /// Month boundaries at which at least one stuck position was drawn down.
    pub replenishment_events: usize,
    pub total_injected: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    pub trades: Vec<ClosedTrade>,
    pub ledger: Vec<LedgerRow>,
    /// Positions still open after the last candle.
    pub open_positions: Vec<Position>,
    pub stats: ExecutionStats,
}

/// Mutable state of one simulation run. Owned exclusively by the run.
#[derive(Debug)]
pub struct Simulator<'a> {
    config: &'a ExecutionConfig,
    permissions: &'a PermissionMap,

    free_capital: f64,
    open_positions: Vec<Position>,
    closed_trades: Vec<ClosedTrade>,
    ledger: Vec<LedgerRow>,
    consumed_signal_dates: HashSet<NaiveDate>,
    last_seen_month: Option<(i32, u32)>,

    // Reference-price tracking
    current_day: Option<NaiveDate>,
    last_close: Option<f64>,
    prior_day_close: Option<f64>,

    next_trade_id: u64,
    stats: ExecutionStats,
}

impl<'a> Simulator<'a> {
    pub fn new(config: &'a ExecutionConfig, permissions: &'a PermissionMap) -> Self {
        Self {
            config,
            permissions,
            free_capital: config.initial_capital,
            open_positions: Vec::new(),
            closed_trades: Vec::new(),
            ledger: Vec::new(),
            consumed_signal_dates: HashSet::new(),
            last_seen_month: None,
            current_day: None,
            last_close: None,
            prior_day_close: None,
            next_trade_id: 1,
            stats: ExecutionStats::default(),
        }
    }

    pub fn free_capital(&self) -> f64 {
        self.free_capital
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    /// Apply one hourly transition.
    pub fn step(&mut self, candle: &Candle) {
        self.track_day(candle);

        let month = candle.month_key();
        if self.last_seen_month.is_some_and(|m| m != month) {
            self.replenish(candle.timestamp);
        }
        self.last_seen_month = Some(month);

        self.evaluate_exits(candle);
        self.evaluate_entry(candle);
        self.emit_ledger(candle.timestamp);

        self.last_close = Some(candle.close);
        self.stats.candles_processed += 1;
    }

    pub fn finish(self) -> ExecutionResult {
        ExecutionResult {
            trades: self.closed_trades,
            ledger: self.ledger,
            open_positions: self.open_positions,
            stats: self.stats,
        }
    }

    /// On a new UTC day, the previous candle's close becomes the reference.
    fn track_day(&mut self, candle: &Candle) {
        let day = candle.day();
        if self.current_day != Some(day) {
            if self.current_day.is_some() {
                self.prior_day_close = self.last_close;
            }
            self.current_day = Some(day);
        }
    }

    fn replenish(&mut self, now: DateTime<Utc>) {
        let max_hold_days = self.config.max_hold_days;
        let stuck_total: f64 = self
            .open_positions
            .iter()
            .filter(|p| p.is_stuck(now, max_hold_days))
            .map(|p| p.remaining_exposed_capital)
            .sum();
        if stuck_total <= 0.0 {
            return;
        }

        let injection = stuck_total.min(self.config.monthly_dca_amount);
        let mut left = injection;
        for position in self
            .open_positions
            .iter_mut()
            .filter(|p| p.is_stuck(now, max_hold_days))
        {
            if left <= 0.0 {
                break;
            }
            let released = position.release(left);
            left -= released;
            debug!(
                trade_id = position.trade_id,
                released,
                remaining = position.remaining_exposed_capital,
                "replenished stuck position"
            );
        }

        self.free_capital += injection;
        self.stats.replenishment_events += 1;
        self.stats.total_injected += injection;
        debug!(%now, injection, free_capital = self.free_capital, "monthly replenishment");
    }

    fn evaluate_exits(&mut self, candle: &Candle) {
        let trigger = self.config.tsl_trigger;
        let distance = self.config.tsl_distance;

        let mut still_open = Vec::with_capacity(self.open_positions.len());
        for mut position in std::mem::take(&mut self.open_positions) {
            if !position.tsl_active {
                if candle.high >= position.entry_price * (1.0 + trigger) {
                    position.tsl_active = true;
                    position.peak_price = candle.high;
                }
            } else {
                position.peak_price = position.peak_price.max(candle.high);
            }

            if position.tsl_active {
                let tsl_price = position.peak_price * (1.0 - distance);
                if candle.low <= tsl_price {
                    let exit_price = candle.open.min(tsl_price);
                    let payout =
                        position.remaining_exposed_capital * (exit_price / position.entry_price);
                    self.free_capital += payout;
                    self.stats.exits += 1;
                    debug!(
                        trade_id = position.trade_id,
                        exit_time = %candle.timestamp,
                        exit_price,
                        payout,
                        "trailing stop exit"
                    );
                    self.closed_trades.push(ClosedTrade::from_position(
                        position,
                        candle.timestamp,
                        exit_price,
                        payout,
                    ));
                    continue;
                }
            }
            still_open.push(position);
        }
        self.open_positions = still_open;
    }

    fn evaluate_entry(&mut self, candle: &Candle) {
        let signal_date = candle.day() - Duration::days(1);
        if self.consumed_signal_dates.contains(&signal_date)
            || !self.permissions.is_permitted(signal_date)
            || self.free_capital <= 0.0
        {
            return;
        }

        // First hours of the data have no prior day; fall back to this open
        let reference_price = self.prior_day_close.unwrap_or(candle.open);
        let dip_target = reference_price * (1.0 - self.config.dip_pct);
        let Some((entry_price, fill)) = dip_fill(candle, dip_target) else {
            return;
        };

        let capital = self.free_capital;
        let position = Position::open(
            self.next_trade_id,
            candle.timestamp,
            entry_price,
            capital,
            signal_date,
        );
        debug!(
            trade_id = position.trade_id,
            entry_time = %candle.timestamp,
            entry_price,
            ?fill,
            capital,
            %signal_date,
            "entry"
        );
        self.next_trade_id += 1;
        self.free_capital = 0.0;
        self.consumed_signal_dates.insert(signal_date);
        self.open_positions.push(position);
        self.stats.entries += 1;
    }

    fn emit_ledger(&mut self, timestamp: DateTime<Utc>) {
        self.ledger.push(LedgerRow {
            timestamp,
            free_capital: self.free_capital,
            active_trades_count: self.open_positions.len(),
            total_exposure: self
                .open_positions
                .iter()
                .map(|p| p.remaining_exposed_capital)
                .sum(),
        });
    }
}

/// Run the simulator over a validated candle series.
///
/// Fails before the first step on bad config, bad candles or duplicate
/// permission dates. Fails mid-run only on cancellation or an exhausted budget.
pub fn run_execution(
    candles: &[Candle],
    permissions: &[DailyPermission],
    config: &ExecutionConfig,
    control: &RunControl,
) -> Result<ExecutionResult, ExecutionError> {
    config.validate()?;
    validate_candles(candles)?;
    let permission_map = PermissionMap::build(permissions)?;

    let budget = control.budget(config.max_steps);
    let mut sim = Simulator::new(config, &permission_map);

    for (step, candle) in candles.iter().enumerate() {
        if control.is_cancelled() {
            return Err(ExecutionError::Cancelled { step });
        }
        if let Some(budget) = budget {
            if step >= budget {
                return Err(ExecutionError::BudgetExhausted { budget });
            }
        }
        sim.step(candle);
    }

    let result = sim.finish();
    info!(
        candles = result.stats.candles_processed,
        entries = result.stats.entries,
        exits = result.stats.exits,
        open = result.open_positions.len(),
        replenishments = result.stats.replenishment_events,
        "execution complete"
    );
    Ok(result)
}
