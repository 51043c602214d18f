//! DipLab Core — pure engine for the hourly dip-entry / trailing-stop backtester.
//!
//! This crate contains no file I/O:
//! - Domain types (candles, permissions, positions, closed trades, ledger rows)
//! - Candle integrity checks, explicit gap repair and daily aggregation
//! - Daily indicators (SMA, EMA, RSI, drawdown) and the signal stage
//! - Entry scan over hourly candles
//! - Execution/capital simulator with monthly replenishment
//! - Post-run accounting audit

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod entry;
pub mod indicators;
pub mod signals;

pub use config::ConfigError;
pub use domain::{Candle, ClosedTrade, DailyPermission, LedgerRow, PermissionMap, Position};
pub use engine::{
    audit, run_execution, AuditReport, ExecutionConfig, ExecutionError, ExecutionResult,
    RunControl,
};
pub use entry::{find_entries, EntryConfig, EntryScan};
pub use signals::{generate_daily_signals, SignalConfig, SignalOutput};
