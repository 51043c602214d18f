//! Parameter sweep over execution settings.
//!
//! Every combination gets its own simulator state; nothing is shared
//! between runs except the read-only candles and permissions. Results come
//! back in grid order whether or not rayon is used.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use diplab_core::domain::{Candle, DailyPermission};
use diplab_core::engine::{
    audit, run_execution, ExecutionConfig, ExecutionError, ExecutionResult, RunControl,
};
use diplab_core::ConfigError;

use crate::artifacts;
use crate::config::short_id;
use crate::metrics::RunMetrics;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("failed to read grid {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid grid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("grid lists {parameter} = {value} more than once")]
    DuplicateValue { parameter: &'static str, value: f64 },

    #[error("combination {index} is invalid: {source}")]
    Config {
        index: usize,
        #[source]
        source: ConfigError,
    },

    #[error("combination {index} failed: {source}")]
    Execution {
        index: usize,
        #[source]
        source: ExecutionError,
    },
}

/// Values to try for each execution parameter. An empty list keeps the
/// base config's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub dip_pct: Vec<f64>,
    pub tsl_trigger: Vec<f64>,
    pub tsl_distance: Vec<f64>,
    pub max_hold_days: Vec<u32>,
    pub monthly_dca_amount: Vec<f64>,
}

fn first_repeat<T: Copy + PartialEq>(values: &[T]) -> Option<T> {
    values
        .iter()
        .enumerate()
        .find(|&(i, v)| values[..i].contains(v))
        .map(|(_, &v)| v)
}

fn or_base<T: Copy>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

impl ParamGrid {
    pub fn from_json_str(s: &str) -> Result<Self, SweepError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, SweepError> {
        let text = std::fs::read_to_string(path).map_err(|source| SweepError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Each axis must list distinct values, since equal combinations would
    /// share a run id.
    pub fn validate(&self) -> Result<(), SweepError> {
        let float_axes = [
            ("dip_pct", &self.dip_pct),
            ("tsl_trigger", &self.tsl_trigger),
            ("tsl_distance", &self.tsl_distance),
            ("monthly_dca_amount", &self.monthly_dca_amount),
        ];
        for (parameter, values) in float_axes {
            if let Some(value) = first_repeat(values) {
                return Err(SweepError::DuplicateValue { parameter, value });
            }
        }
        if let Some(days) = first_repeat(&self.max_hold_days) {
            return Err(SweepError::DuplicateValue {
                parameter: "max_hold_days",
                value: f64::from(days),
            });
        }
        Ok(())
    }

    /// Number of combinations in the grid.
    pub fn size(&self) -> usize {
        [
            self.dip_pct.len(),
            self.tsl_trigger.len(),
            self.tsl_distance.len(),
            self.max_hold_days.len(),
            self.monthly_dca_amount.len(),
        ]
        .iter()
        .map(|&n| n.max(1))
        .product()
    }

    /// Cartesian product, last parameter varying fastest.
    pub fn generate_configs(&self, base: &ExecutionConfig) -> Vec<ExecutionConfig> {
        let mut configs = Vec::with_capacity(self.size());

        for &dip_pct in &or_base(&self.dip_pct, base.dip_pct) {
            for &tsl_trigger in &or_base(&self.tsl_trigger, base.tsl_trigger) {
                for &tsl_distance in &or_base(&self.tsl_distance, base.tsl_distance) {
                    for &max_hold_days in &or_base(&self.max_hold_days, base.max_hold_days) {
                        for &monthly_dca_amount in
                            &or_base(&self.monthly_dca_amount, base.monthly_dca_amount)
                        {
                            configs.push(ExecutionConfig {
                                dip_pct,
                                tsl_trigger,
                                tsl_distance,
                                max_hold_days,
                                monthly_dca_amount,
                                ..base.clone()
                            });
                        }
                    }
                }
            }
        }

        configs
    }
}

/// One line of `sweep_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub run_id: String,
    pub dip_pct: f64,
    pub tsl_trigger: f64,
    pub tsl_distance: f64,
    pub max_hold_days: u32,
    pub monthly_dca_amount: f64,
    pub final_equity: f64,
    pub max_exposure: f64,
    /// Negative fraction, as in `RunMetrics`.
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub accounting_breach: bool,
}

/// A finished combination: its summary row and full execution output.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRun {
    pub row: SweepRow,
    pub execution: ExecutionResult,
}

/// Results from a parameter sweep, in grid order.
#[derive(Debug)]
pub struct SweepResults {
    runs: Vec<SweepRun>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(runs: Vec<SweepRun>) -> Self {
        let by_run_id = runs
            .iter()
            .enumerate()
            .map(|(i, r)| (r.row.run_id.clone(), i))
            .collect();
        Self { runs, by_run_id }
    }

    pub fn all(&self) -> &[SweepRun] {
        &self.runs
    }

    pub fn rows(&self) -> Vec<SweepRow> {
        self.runs.iter().map(|r| r.row.clone()).collect()
    }

    pub fn get(&self, run_id: &str) -> Option<&SweepRun> {
        self.by_run_id.get(run_id).map(|&i| &self.runs[i])
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Content-addressed id of one execution config.
pub fn execution_run_id(config: &ExecutionConfig) -> String {
    let json = serde_json::to_string(config).unwrap_or_else(|_| format!("{config:?}"));
    blake3::hash(json.as_bytes()).to_hex().to_string()
}

fn run_one(
    index: usize,
    config: &ExecutionConfig,
    candles: &[Candle],
    permissions: &[DailyPermission],
    control: &RunControl,
) -> Result<SweepRun, SweepError> {
    let execution = run_execution(candles, permissions, config, control)
        .map_err(|source| SweepError::Execution { index, source })?;
    let metrics = RunMetrics::compute(&execution);
    let report = audit(&execution.trades, &execution.ledger);

    let row = SweepRow {
        run_id: execution_run_id(config),
        dip_pct: config.dip_pct,
        tsl_trigger: config.tsl_trigger,
        tsl_distance: config.tsl_distance,
        max_hold_days: config.max_hold_days,
        monthly_dca_amount: config.monthly_dca_amount,
        final_equity: metrics.final_equity,
        max_exposure: metrics.max_exposure,
        max_drawdown: metrics.max_drawdown,
        trade_count: metrics.trade_count,
        accounting_breach: report.flags.accounting_breach,
    };
    tracing::debug!(
        index,
        run_id = short_id(&row.run_id),
        final_equity = row.final_equity,
        "sweep combination done"
    );
    Ok(SweepRun { row, execution })
}

/// Run every grid combination against the same data.
///
/// The grid and all combinations are validated before any runs. The first failing run
/// (cancellation, exhausted budget) aborts the sweep.
pub fn run_sweep(
    candles: &[Candle],
    permissions: &[DailyPermission],
    base: &ExecutionConfig,
    grid: &ParamGrid,
    parallel: bool,
    control: &RunControl,
) -> Result<SweepResults, SweepError> {
    grid.validate()?;
    let configs = grid.generate_configs(base);
    for (index, config) in configs.iter().enumerate() {
        config
            .validate()
            .map_err(|source| SweepError::Config { index, source })?;
    }

    let runs: Vec<SweepRun> = if parallel {
        configs
            .par_iter()
            .enumerate()
            .map(|(i, config)| run_one(i, config, candles, permissions, control))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        configs
            .iter()
            .enumerate()
            .map(|(i, config)| run_one(i, config, candles, permissions, control))
            .collect::<Result<Vec<_>, _>>()?
    };

    tracing::info!(combinations = runs.len(), parallel, "sweep complete");
    Ok(SweepResults::new(runs))
}

/// Write `sweep_summary.csv` and, when `per_run` is set, a
/// `run_<id>/trades.csv` + `capital_ledger.csv` pair for each combination.
pub fn save_sweep(results: &SweepResults, dir: &Path, per_run: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create sweep dir: {}", dir.display()))?;

    let summary_path = dir.join("sweep_summary.csv");
    artifacts::write_file(&summary_path, &artifacts::sweep_summary_csv(&results.rows())?)?;

    if per_run {
        for run in results.all() {
            let run_dir = dir.join(format!("run_{}", short_id(&run.row.run_id)));
            std::fs::create_dir_all(&run_dir)
                .with_context(|| format!("failed to create {}", run_dir.display()))?;
            artifacts::write_file(
                &run_dir.join("trades.csv"),
                &artifacts::trades_csv(&run.execution.trades)?,
            )?;
            artifacts::write_file(
                &run_dir.join("capital_ledger.csv"),
                &artifacts::ledger_csv(&run.execution.ledger)?,
            )?;
        }
    }

    Ok(summary_path)
}
