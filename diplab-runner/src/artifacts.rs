//! Tabular artifacts: CSV writers for every pipeline stage, readers for the
//! two tables the audit consumes, and the sweep summary reader.
//!
//! Trades and ledger tables always carry a header row, even when empty.
//! Capital columns are written at full precision so a re-read audit sees
//! exactly what the simulator produced. The readers only insist on the
//! columns the audit needs, so tables written by other tools (with
//! `entry_datetime`/`exit_datetime` and pandas timestamps) audit too.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use diplab_core::domain::{Candle, ClosedTrade, LedgerRow};
use diplab_core::engine::{audit, AuditReport};
use diplab_core::entry::{Entry, FillKind};
use diplab_core::signals::DailySignal;
use serde::Deserialize;
use thiserror::Error;

use crate::data_loader::{parse_bool, parse_timestamp};
use crate::sweep::SweepRow;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to flush CSV buffer: {0}")]
    Flush(#[source] std::io::Error),

    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}, row {row}: {message}")]
    Parse {
        path: PathBuf,
        row: usize,
        message: String,
    },
}

pub const TRADE_COLUMNS: [&str; 13] = [
    "trade_id",
    "signal_date",
    "entry_time",
    "entry_price",
    "exit_time",
    "exit_price",
    "initial_capital",
    "remaining_exposed_capital",
    "replenished_capital_cumulative",
    "payout",
    "return_pct",
    "tsl_active",
    "peak_price",
];

/// Trade columns the audit reads.
pub const AUDIT_TRADE_COLUMNS: [&str; 3] = [
    "initial_capital",
    "remaining_exposed_capital",
    "replenished_capital_cumulative",
];

pub const SWEEP_COLUMNS: [&str; 11] = [
    "run_id",
    "dip_pct",
    "tsl_trigger",
    "tsl_distance",
    "max_hold_days",
    "monthly_dca_amount",
    "final_equity",
    "max_exposure",
    "max_drawdown",
    "trade_count",
    "accounting_breach",
];

pub const LEDGER_COLUMNS: [&str; 4] = [
    "timestamp",
    "free_capital",
    "active_trades_count",
    "total_exposure",
];

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ArtifactError> {
    let data = wtr
        .into_inner()
        .map_err(|e| ArtifactError::Flush(e.into_error()))?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// NaN indicator values are written as empty cells.
fn opt_num(v: f64) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        String::new()
    }
}

// ─── Writers ────────────────────────────────────────────────────────

pub fn trades_csv(trades: &[ClosedTrade]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(TRADE_COLUMNS)?;
    for t in trades {
        wtr.write_record([
            t.trade_id.to_string(),
            t.signal_date.to_string(),
            t.entry_time.to_rfc3339(),
            t.entry_price.to_string(),
            t.exit_time.to_rfc3339(),
            t.exit_price.to_string(),
            t.initial_capital.to_string(),
            t.remaining_exposed_capital.to_string(),
            t.replenished_capital_cumulative.to_string(),
            t.payout.to_string(),
            format!("{:.6}", t.return_pct()),
            t.tsl_active.to_string(),
            t.peak_price.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn ledger_csv(ledger: &[LedgerRow]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(LEDGER_COLUMNS)?;
    for row in ledger {
        wtr.write_record([
            row.timestamp.to_rfc3339(),
            row.free_capital.to_string(),
            row.active_trades_count.to_string(),
            row.total_exposure.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Hourly candles in the layout `load_candles` reads.
pub fn candles_csv(candles: &[Candle]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
    for c in candles {
        wtr.write_record([
            c.timestamp.to_rfc3339(),
            c.open.to_string(),
            c.high.to_string(),
            c.low.to_string(),
            c.close.to_string(),
            c.volume.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Daily signal table. Readable back as a permission table.
pub fn signals_csv(signals: &[DailySignal]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "ma_value",
        "rsi",
        "peak",
        "drawdown",
        "permitted",
        "reason_flags",
    ])?;
    for s in signals {
        wtr.write_record([
            s.date.to_string(),
            s.open.to_string(),
            s.high.to_string(),
            s.low.to_string(),
            s.close.to_string(),
            s.volume.to_string(),
            opt_num(s.ma_value),
            opt_num(s.rsi),
            s.peak.to_string(),
            format!("{:.6}", s.drawdown),
            s.permitted.to_string(),
            s.reason_string(),
        ])?;
    }
    finish(wtr)
}

pub fn entries_csv(entries: &[Entry]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "signal_date",
        "entry_time",
        "entry_price",
        "reference_price",
        "target_price",
        "fill",
    ])?;
    for e in entries {
        let fill = match e.fill {
            FillKind::Gap => "gap",
            FillKind::Limit => "limit",
        };
        wtr.write_record([
            e.signal_date.to_string(),
            e.entry_time.to_rfc3339(),
            e.entry_price.to_string(),
            e.reference_price.to_string(),
            e.target_price.to_string(),
            fill.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn sweep_summary_csv(rows: &[SweepRow]) -> Result<String, ArtifactError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(SWEEP_COLUMNS)?;
    for r in rows {
        wtr.write_record([
            r.run_id.clone(),
            r.dip_pct.to_string(),
            r.tsl_trigger.to_string(),
            r.tsl_distance.to_string(),
            r.max_hold_days.to_string(),
            r.monthly_dca_amount.to_string(),
            format!("{:.2}", r.final_equity),
            format!("{:.2}", r.max_exposure),
            format!("{:.6}", r.max_drawdown),
            r.trade_count.to_string(),
            r.accounting_breach.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn audit_json(report: &AuditReport) -> Result<String, ArtifactError> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write `contents` to `path`, naming the path on failure.
pub fn write_file(path: &Path, contents: &str) -> Result<(), ArtifactError> {
    std::fs::write(path, contents).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ─── Readers ────────────────────────────────────────────────────────

/// Only the capital columns are required; the rest fall back to what can
/// be derived.
#[derive(Debug, Deserialize)]
struct TradeRecord {
    #[serde(default)]
    trade_id: Option<u64>,
    #[serde(default)]
    signal_date: Option<String>,
    #[serde(default, alias = "entry_datetime")]
    entry_time: Option<String>,
    #[serde(default)]
    entry_price: Option<f64>,
    #[serde(default, alias = "exit_datetime")]
    exit_time: Option<String>,
    #[serde(default)]
    exit_price: Option<f64>,
    initial_capital: f64,
    remaining_exposed_capital: f64,
    replenished_capital_cumulative: f64,
    #[serde(default)]
    payout: Option<f64>,
    #[serde(default)]
    tsl_active: Option<String>,
    #[serde(default)]
    peak_price: Option<f64>,
}

fn optional_time(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| format!("bad {field} '{s}'")),
    }
}

impl TradeRecord {
    fn into_trade(self, row: usize) -> Result<ClosedTrade, String> {
        let entry_time = optional_time("entry_time", self.entry_time.as_deref())?;
        let exit_time = optional_time("exit_time", self.exit_time.as_deref())?;
        let signal_date = match self.signal_date.as_deref().map(str::trim) {
            None | Some("") => entry_time.map(|t| t.date_naive() - Duration::days(1)),
            Some(s) => Some(
                NaiveDate::parse_from_str(s.get(..10).unwrap_or(s), "%Y-%m-%d")
                    .map_err(|e| format!("bad signal_date '{s}': {e}"))?,
            ),
        };
        let entry_price = self.entry_price.unwrap_or(f64::NAN);
        let exit_price = self.exit_price.unwrap_or(f64::NAN);

        Ok(ClosedTrade {
            trade_id: self.trade_id.unwrap_or(row as u64),
            signal_date: signal_date.unwrap_or_default(),
            entry_time: entry_time.unwrap_or_default(),
            entry_price,
            exit_time: exit_time.unwrap_or_default(),
            exit_price,
            initial_capital: self.initial_capital,
            remaining_exposed_capital: self.remaining_exposed_capital,
            replenished_capital_cumulative: self.replenished_capital_cumulative,
            payout: self
                .payout
                .unwrap_or(self.remaining_exposed_capital * exit_price / entry_price),
            tsl_active: self
                .tsl_active
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(false),
            peak_price: self.peak_price.unwrap_or(f64::NAN),
        })
    }
}

#[derive(Debug, Deserialize)]
struct LedgerRecord {
    timestamp: String,
    free_capital: f64,
    active_trades_count: usize,
    total_exposure: f64,
}

fn open_checked(
    path: &Path,
    required: &[&str],
) -> Result<csv::Reader<std::fs::File>, ArtifactError> {
    let file = std::fs::File::open(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let headers = reader.headers()?.clone();
    if let Some(missing) = required.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        return Err(ArtifactError::MissingColumn {
            path: path.to_path_buf(),
            column: missing.to_string(),
        });
    }
    Ok(reader)
}

pub fn read_trades(path: &Path) -> Result<Vec<ClosedTrade>, ArtifactError> {
    let mut reader = open_checked(path, &AUDIT_TRADE_COLUMNS)?;
    reader
        .deserialize::<TradeRecord>()
        .enumerate()
        .map(|(i, record)| {
            record?.into_trade(i + 1).map_err(|message| ArtifactError::Parse {
                path: path.to_path_buf(),
                row: i + 1,
                message,
            })
        })
        .collect()
}

pub fn read_ledger(path: &Path) -> Result<Vec<LedgerRow>, ArtifactError> {
    let mut reader = open_checked(path, &LEDGER_COLUMNS)?;
    reader
        .deserialize::<LedgerRecord>()
        .enumerate()
        .map(|(i, record)| {
            let r = record?;
            let timestamp = parse_timestamp(&r.timestamp).ok_or_else(|| ArtifactError::Parse {
                path: path.to_path_buf(),
                row: i + 1,
                message: format!("bad timestamp '{}'", r.timestamp),
            })?;
            Ok(LedgerRow {
                timestamp,
                free_capital: r.free_capital,
                active_trades_count: r.active_trades_count,
                total_exposure: r.total_exposure,
            })
        })
        .collect()
}

/// Read `sweep_summary.csv` back into rows.
pub fn read_sweep_summary(path: &Path) -> Result<Vec<SweepRow>, ArtifactError> {
    let mut reader = open_checked(path, &SWEEP_COLUMNS)?;
    reader
        .deserialize::<SweepRow>()
        .map(|r| Ok(r?))
        .collect()
}

/// Re-read persisted trades and ledger tables and audit them.
///
/// Fails only when a table cannot be read or lacks a required column;
/// anomalies in the rows are reported as counters.
pub fn audit_artifacts(
    trades_path: &Path,
    ledger_path: &Path,
) -> Result<AuditReport, ArtifactError> {
    let trades = read_trades(trades_path)?;
    let ledger = read_ledger(ledger_path)?;
    let report = audit(&trades, &ledger);
    tracing::info!(
        trades = trades.len(),
        ledger_rows = ledger.len(),
        breach = report.flags.accounting_breach,
        "audited artifacts"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_trade() -> ClosedTrade {
        let entry = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
        ClosedTrade {
            trade_id: 7,
            signal_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            entry_time: entry,
            entry_price: 98.0,
            exit_time: entry + Duration::hours(30),
            exit_price: 104.37,
            initial_capital: 10_000.0 / 3.0,
            remaining_exposed_capital: 10_000.0 / 3.0 - 0.1,
            replenished_capital_cumulative: 0.1,
            payout: 3_500.123456789,
            tsl_active: true,
            peak_price: 107.6,
        }
    }

    #[test]
    fn empty_tables_still_have_headers() {
        let trades = trades_csv(&[]).unwrap();
        assert_eq!(trades.trim_end(), TRADE_COLUMNS.join(","));
        let ledger = ledger_csv(&[]).unwrap();
        assert_eq!(ledger.trim_end(), LEDGER_COLUMNS.join(","));
    }

    #[test]
    fn persisted_trades_keep_full_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        let trade = sample_trade();
        write_file(&path, &trades_csv(&[trade.clone()]).unwrap()).unwrap();

        let back = read_trades(&path).unwrap();
        assert_eq!(back, vec![trade]);
    }

    #[test]
    fn audit_fails_on_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let trades = dir.path().join("trades.csv");
        let ledger = dir.path().join("ledger.csv");
        write_file(&trades, &trades_csv(&[sample_trade()]).unwrap()).unwrap();
        write_file(&ledger, "timestamp,free_capital,total_exposure\n").unwrap();

        match audit_artifacts(&trades, &ledger) {
            Err(ArtifactError::MissingColumn { column, .. }) => {
                assert_eq!(column, "active_trades_count")
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn audit_of_persisted_tables_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let trade = sample_trade();
        let t0 = trade.entry_time;
        let ledger = vec![
            LedgerRow {
                timestamp: t0,
                free_capital: 0.0,
                active_trades_count: 1,
                total_exposure: trade.initial_capital,
            },
            // off-schedule: free capital rises at 11:00 with no exit
            LedgerRow {
                timestamp: t0 + Duration::hours(1),
                free_capital: 50.0,
                active_trades_count: 1,
                total_exposure: trade.initial_capital - 50.0,
            },
        ];
        let trades_path = dir.path().join("trades.csv");
        let ledger_path = dir.path().join("capital_ledger.csv");
        write_file(&trades_path, &trades_csv(&[trade.clone()]).unwrap()).unwrap();
        write_file(&ledger_path, &ledger_csv(&ledger).unwrap()).unwrap();

        let from_disk = audit_artifacts(&trades_path, &ledger_path).unwrap();
        assert_eq!(from_disk, audit(&[trade], &ledger));
        assert_eq!(from_disk.counters.off_schedule_injections_observed, 1);
        assert!(from_disk.flags.accounting_breach);
    }

    #[test]
    fn audit_json_shape() {
        let report = audit(&[], &[]);
        let value: serde_json::Value = serde_json::from_str(&audit_json(&report).unwrap()).unwrap();
        assert_eq!(value["counters"]["negative_balance_observed"], 0);
        assert_eq!(value["flags"]["accounting_breach"], false);
        assert!(value["note"].is_string());
    }

    #[test]
    fn audits_tables_in_the_pandas_layout() {
        let dir = tempfile::tempdir().unwrap();
        let trades = dir.path().join("trades.csv");
        let ledger = dir.path().join("capital_ledger.csv");
        write_file(
            &trades,
            "entry_datetime,entry_price,initial_capital,replenished_capital_cumulative,\
             remaining_exposed_capital,tsl_active,peak_price,signal_date,exit_datetime,exit_price\n\
             2017-10-21 03:00:00,98.0,10000.0,0.0,10000.0,True,105.0,2017-10-20,\
             2017-10-22 05:00:00,103.95\n",
        )
        .unwrap();
        write_file(
            &ledger,
            "timestamp,free_capital,active_trades_count,total_exposure\n\
             2017-10-21 02:00:00,10000.0,0,0.0\n\
             2017-10-21 03:00:00,0.0,1,10000.0\n\
             2017-10-22 05:00:00,10607.14,0,0.0\n",
        )
        .unwrap();

        let read = read_trades(&trades).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].trade_id, 1);
        assert_eq!(read[0].signal_date, NaiveDate::from_ymd_opt(2017, 10, 20).unwrap());
        assert!(read[0].tsl_active);
        assert!((read[0].payout - 10_000.0 * 103.95 / 98.0).abs() < 1e-9);

        let report = audit_artifacts(&trades, &ledger).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.note, None);
    }

    #[test]
    fn trades_need_only_the_capital_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        write_file(
            &path,
            "initial_capital,remaining_exposed_capital,replenished_capital_cumulative\n\
             1000,900,50\n",
        )
        .unwrap();
        let trades = read_trades(&path).unwrap();
        assert!(trades[0].conservation_error() > 49.0);

        write_file(&path, "initial_capital,remaining_exposed_capital\n1000,1000\n").unwrap();
        match read_trades(&path) {
            Err(ArtifactError::MissingColumn { column, .. }) => {
                assert_eq!(column, "replenished_capital_cumulative")
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn sweep_summary_reads_back() {
        let row = SweepRow {
            run_id: "ab12".to_string(),
            dip_pct: 0.02,
            tsl_trigger: 0.05,
            tsl_distance: 0.03,
            max_hold_days: 30,
            monthly_dca_amount: 1_000.0,
            final_equity: 12_345.67,
            max_exposure: 10_000.0,
            max_drawdown: -0.125,
            trade_count: 9,
            accounting_breach: false,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep_summary.csv");
        write_file(&path, &sweep_summary_csv(&[row.clone()]).unwrap()).unwrap();
        assert_eq!(read_sweep_summary(&path).unwrap(), vec![row]);
    }
}
