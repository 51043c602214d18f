//! Pipeline runner — wires loading, signals, entry scan, execution, audit
//! and metrics together.
//!
//! Two entry points:
//! - `run_pipeline()`: reads the files named in the config. Used by the CLI.
//! - `run_on_data()`: takes pre-loaded candles and optional permissions, no I/O.
//!   Used by the stress battery and tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use diplab_core::data::{repair_gaps, validate_candles, CandleError};
use diplab_core::domain::{Candle, DailyPermission, PermissionError, PermissionMap};
use diplab_core::engine::{
    audit, run_execution, AuditReport, ExecutionError, ExecutionResult, ExecutionStats, RunControl,
};
use diplab_core::entry::{find_entries, EntryScan, EntryScanSummary};
use diplab_core::signals::{generate_daily_signals, DailySignal};
use diplab_core::ConfigError;

use crate::artifacts::{self, ArtifactError};
use crate::config::{short_id, BacktestConfig, RunId};
use crate::data_loader::{dataset_hash, load_candles, load_permissions, LoadError};
use crate::metrics::RunMetrics;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("candle integrity: {0}")]
    Candles(#[from] CandleError),
    #[error("permission table: {0}")]
    Permissions(#[from] PermissionError),
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Current schema version for `manifest.json`.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything one pipeline run produced, in memory.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: RunId,
    pub dataset_hash: String,
    pub candle_count: usize,
    pub repaired_hours: usize,
    /// Empty when permissions were loaded from a file.
    pub signals: Vec<DailySignal>,
    pub permissions: Vec<DailyPermission>,
    pub entry_scan: EntryScan,
    pub execution: ExecutionResult,
    pub audit: AuditReport,
    pub metrics: RunMetrics,
}

/// Summary persisted as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub candle_count: usize,
    pub repaired_hours: usize,
    pub signal_days: usize,
    pub permitted_days: usize,
    pub entry_scan: EntryScanSummary,
    pub execution: ExecutionStats,
    pub metrics: RunMetrics,
    pub audit: AuditReport,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl PipelineResult {
    pub fn manifest(&self) -> Manifest {
        Manifest {
            schema_version: SCHEMA_VERSION,
            run_id: self.run_id.clone(),
            dataset_hash: self.dataset_hash.clone(),
            candle_count: self.candle_count,
            repaired_hours: self.repaired_hours,
            signal_days: self.permissions.len(),
            permitted_days: self.permissions.iter().filter(|p| p.permitted).count(),
            entry_scan: self.entry_scan.summary.clone(),
            execution: self.execution.stats.clone(),
            metrics: self.metrics.clone(),
            audit: self.audit.clone(),
        }
    }
}

/// Run the full pipeline from the files named in `config.data`.
pub fn run_pipeline(
    config: &BacktestConfig,
    control: &RunControl,
) -> Result<PipelineResult, RunError> {
    config.validate()?;
    let candles = load_candles(&config.data.hourly_path)?;
    let permissions = match &config.data.signals_path {
        Some(path) => Some(load_permissions(path)?),
        None => None,
    };
    run_on_data(config, candles, permissions, control)
}

/// Run the pipeline on pre-loaded data. When `permissions` is `None` the
/// signal stage derives them from the candles.
pub fn run_on_data(
    config: &BacktestConfig,
    candles: Vec<Candle>,
    permissions: Option<Vec<DailyPermission>>,
    control: &RunControl,
) -> Result<PipelineResult, RunError> {
    config.validate()?;

    let (candles, repaired_hours) = if config.data.repair_gaps {
        repair_gaps(&candles)
    } else {
        (candles, 0)
    };
    validate_candles(&candles)?;
    let hash = dataset_hash(&candles);

    let (signals, permissions) = match permissions {
        Some(p) => (Vec::new(), p),
        None => {
            let out = generate_daily_signals(&candles, &config.signals)?;
            let perms = out.permissions();
            (out.signals, perms)
        }
    };

    let permission_map = PermissionMap::build(&permissions)?;
    let entry_scan = find_entries(&candles, &permission_map, &config.entry)?;
    let execution = run_execution(&candles, &permissions, &config.execution, control)?;
    let report = audit(&execution.trades, &execution.ledger);
    let metrics = RunMetrics::compute(&execution);

    let run_id = config.run_id();
    tracing::info!(
        run_id = short_id(&run_id),
        candles = candles.len(),
        repaired_hours,
        permitted_days = permission_map.permitted_count(),
        trades = metrics.trade_count,
        final_equity = metrics.final_equity,
        breach = report.flags.accounting_breach,
        "pipeline complete"
    );

    Ok(PipelineResult {
        run_id,
        dataset_hash: hash,
        candle_count: candles.len(),
        repaired_hours,
        signals,
        permissions,
        entry_scan,
        execution,
        audit: report,
        metrics,
    })
}

/// Write the artifact set of one run into `<output.dir>/run_<id>/`.
///
/// Files: `trades.csv`, `capital_ledger.csv`, `entries.csv`,
/// `audit_report.json`, `manifest.json`, plus `daily_signals.csv` when the
/// signal stage ran and `config_snapshot.toml` when enabled.
pub fn save_artifacts(result: &PipelineResult, config: &BacktestConfig) -> Result<PathBuf> {
    let run_dir = config
        .output
        .dir
        .join(format!("run_{}", short_id(&result.run_id)));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    write_artifact(&run_dir, "trades.csv", artifacts::trades_csv(&result.execution.trades)?)?;
    write_artifact(
        &run_dir,
        "capital_ledger.csv",
        artifacts::ledger_csv(&result.execution.ledger)?,
    )?;
    write_artifact(&run_dir, "entries.csv", artifacts::entries_csv(&result.entry_scan.entries)?)?;
    if !result.signals.is_empty() {
        write_artifact(&run_dir, "daily_signals.csv", artifacts::signals_csv(&result.signals)?)?;
    }
    write_artifact(&run_dir, "audit_report.json", artifacts::audit_json(&result.audit)?)?;

    let manifest = serde_json::to_string_pretty(&result.manifest())
        .context("failed to serialize manifest")?;
    write_artifact(&run_dir, "manifest.json", manifest)?;

    if config.output.save_config_snapshot {
        write_artifact(&run_dir, "config_snapshot.toml", config.to_toml_string()?)?;
    }

    tracing::info!(dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

fn write_artifact(dir: &Path, name: &str, contents: String) -> Result<()> {
    let path = dir.join(name);
    artifacts::write_file(&path, &contents).with_context(|| format!("failed to write {name}"))
}
