//! DipLab CLI — one command per pipeline stage plus full runs, sweeps and
//! synthetic stress tests.
//!
//! Commands:
//! - `signals` — hourly CSV → daily signal table
//! - `entries` — hourly CSV + permissions → first dip entry per signal day
//! - `execute` — hourly CSV + permissions → trades and capital ledger
//! - `audit` — trades + ledger tables → audit report JSON
//! - `run` — the full pipeline from a TOML config, with artifacts
//! - `sweep` — execution parameter grid over one dataset
//! - `synth` — write synthetic scenario series as hourly CSVs
//! - `stress` — run the stress battery over every scenario
//! - `analyze sweep` — drawdown sensitivity of a saved sweep summary
//! - `analyze regimes` — one run per market regime window

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use diplab_core::data::{repair_gaps, validate_candles};
use diplab_core::domain::{Candle, DailyPermission, PermissionMap};
use diplab_core::engine::{run_execution, RunControl};
use diplab_core::entry::find_entries;
use diplab_core::signals::generate_daily_signals;
use diplab_runner::analysis::{analyze_sweep, compare_regimes};
use diplab_runner::artifacts::{self, audit_artifacts, read_sweep_summary};
use diplab_runner::sweep::{run_sweep, save_sweep, ParamGrid};
use diplab_runner::synthetic::{generate, Scenario, SyntheticSpec};
use diplab_runner::{
    load_candles, load_permissions, run_pipeline, run_stress_battery, save_artifacts,
    short_id, BacktestConfig, PipelineResult,
};

#[derive(Parser)]
#[command(
    name = "diplab",
    about = "DipLab CLI — hourly dip-entry / trailing-stop backtester"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate hourly candles to days and compute the daily permission table.
    Signals {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "daily_signals.csv")]
        output: PathBuf,
        /// TOML config; only `[signals]` and `data.repair_gaps` are used.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Find the first hourly dip entry for each permitted day.
    Entries {
        #[arg(long)]
        input: PathBuf,
        /// Permission table (signal stage output or date,permitted,... CSV).
        #[arg(long)]
        signals: PathBuf,
        #[arg(long, default_value = "entries.csv")]
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run the capital simulator and write trades.csv + capital_ledger.csv.
    Execute {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        signals: PathBuf,
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Stop with an error after this many hours.
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Audit persisted trades and ledger tables.
    Audit {
        #[arg(long)]
        trades: PathBuf,
        #[arg(long)]
        ledger: PathBuf,
        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Full pipeline from a TOML config; artifacts go to `output.dir`.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Sweep execution parameters over one dataset.
    Sweep {
        #[arg(long)]
        config: PathBuf,
        /// JSON grid, e.g. {"tsl_trigger": [0.03, 0.05], "max_hold_days": [30, 90]}.
        #[arg(long)]
        grid: PathBuf,
        #[arg(long, default_value = "results/sweep")]
        output_dir: PathBuf,
        /// Run combinations one at a time.
        #[arg(long, default_value_t = false)]
        serial: bool,
        /// Also write trades and ledger for every combination.
        #[arg(long, default_value_t = false)]
        per_run: bool,
    },
    /// Write synthetic scenario series as hourly CSVs.
    Synth {
        /// flash_crash, deep_bleed, chop_tight, chop_wild or all.
        #[arg(long, default_value = "all")]
        scenario: String,
        #[arg(long, default_value = "data/synthetic")]
        output_dir: PathBuf,
        #[arg(long, default_value_t = 1500)]
        hours: usize,
        #[arg(long, default_value_t = 10_000.0)]
        base_price: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Run every synthetic scenario with the stress config and audit each.
    Stress {
        #[arg(long, default_value_t = 1500)]
        hours: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = false)]
        serial: bool,
        /// Write outcomes as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Robustness analysis of sweeps and market regimes.
    Analyze {
        #[command(subcommand)]
        target: AnalyzeTarget,
    },
}

#[derive(Subcommand)]
enum AnalyzeTarget {
    /// Drawdown sensitivity per parameter from a sweep_summary.csv.
    Sweep {
        #[arg(long)]
        summary: PathBuf,
        #[arg(long, default_value = "results/sweep/sweep_analysis.json")]
        output: PathBuf,
    },
    /// Split the data into volatility, trend and liquidity regimes and run
    /// the config's execution settings over each.
    Regimes {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "results/regime_comparison.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Signals {
            input,
            output,
            config,
        } => run_signals(&input, &output, config.as_deref()),
        Commands::Entries {
            input,
            signals,
            output,
            config,
        } => run_entries(&input, &signals, &output, config.as_deref()),
        Commands::Execute {
            input,
            signals,
            output_dir,
            config,
            max_steps,
        } => run_execute(&input, &signals, &output_dir, config.as_deref(), max_steps),
        Commands::Audit {
            trades,
            ledger,
            output,
        } => run_audit(&trades, &ledger, output.as_deref()),
        Commands::Run { config } => run_full(&config),
        Commands::Sweep {
            config,
            grid,
            output_dir,
            serial,
            per_run,
        } => run_sweep_cmd(&config, &grid, &output_dir, !serial, per_run),
        Commands::Synth {
            scenario,
            output_dir,
            hours,
            base_price,
            seed,
        } => run_synth(&scenario, &output_dir, hours, base_price, seed),
        Commands::Stress {
            hours,
            seed,
            serial,
            output,
        } => run_stress(hours, seed, !serial, output.as_deref()),
        Commands::Analyze {
            target: AnalyzeTarget::Sweep { summary, output },
        } => run_analyze_sweep(&summary, &output),
        Commands::Analyze {
            target: AnalyzeTarget::Regimes { config, output },
        } => run_analyze_regimes(&config, &output),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "diplab=debug" } else { "diplab=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BacktestConfig> {
    match path {
        Some(p) => {
            BacktestConfig::load(p).with_context(|| format!("loading config {}", p.display()))
        }
        None => Ok(BacktestConfig::default()),
    }
}

fn load_hourly(path: &Path, config: &BacktestConfig) -> Result<Vec<Candle>> {
    let candles = load_candles(path)?;
    let candles = if config.data.repair_gaps {
        let (repaired, inserted) = repair_gaps(&candles);
        if inserted > 0 {
            tracing::warn!(inserted, "filled missing hours with flat candles");
        }
        repaired
    } else {
        candles
    };
    validate_candles(&candles).with_context(|| format!("validating {}", path.display()))?;
    Ok(candles)
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    artifacts::write_file(path, contents)?;
    Ok(())
}

fn run_signals(input: &Path, output: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let candles = load_hourly(input, &config)?;
    let out = generate_daily_signals(&candles, &config.signals)?;

    write_output(output, &artifacts::signals_csv(&out.signals)?)?;
    println!(
        "{} days ({} permitted, {} incomplete dropped) → {}",
        out.signals.len(),
        out.permitted_count(),
        out.dropped_days.len(),
        output.display()
    );
    Ok(())
}

fn run_entries(input: &Path, signals: &Path, output: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let candles = load_hourly(input, &config)?;
    let permissions = load_permissions(signals)?;
    let map = PermissionMap::build(&permissions)?;
    let scan = find_entries(&candles, &map, &config.entry)?;

    write_output(output, &artifacts::entries_csv(&scan.entries)?)?;
    let s = &scan.summary;
    println!(
        "{} eligible signals, {} entries, {} missed ({:.1}% conversion) → {}",
        s.eligible_signals,
        s.entries_found,
        s.missed_signals,
        s.conversion_rate * 100.0,
        output.display()
    );
    Ok(())
}

fn run_execute(
    input: &Path,
    signals: &Path,
    output_dir: &Path,
    config: Option<&Path>,
    max_steps: Option<usize>,
) -> Result<()> {
    let config = load_config(config)?;
    let candles = load_hourly(input, &config)?;
    let permissions: Vec<DailyPermission> = load_permissions(signals)?;

    let control = match max_steps {
        Some(n) => RunControl::unbounded().with_max_steps(n),
        None => RunControl::unbounded(),
    };
    let result = run_execution(&candles, &permissions, &config.execution, &control)?;

    write_output(&output_dir.join("trades.csv"), &artifacts::trades_csv(&result.trades)?)?;
    write_output(
        &output_dir.join("capital_ledger.csv"),
        &artifacts::ledger_csv(&result.ledger)?,
    )?;

    let final_equity = result.ledger.last().map(|r| r.equity()).unwrap_or(0.0);
    println!(
        "{} trades closed, {} open at end, final equity {:.2}, {} replenishment events → {}",
        result.trades.len(),
        result.open_positions.len(),
        final_equity,
        result.stats.replenishment_events,
        output_dir.display()
    );
    Ok(())
}

fn run_audit(trades: &Path, ledger: &Path, output: Option<&Path>) -> Result<()> {
    let report = audit_artifacts(trades, ledger)?;
    let json = artifacts::audit_json(&report)?;
    match output {
        Some(path) => {
            write_output(path, &json)?;
            println!("audit report → {}", path.display());
        }
        None => println!("{json}"),
    }
    if report.flags.accounting_breach {
        tracing::warn!(?report.counters, "accounting breach detected");
    }
    Ok(())
}

fn run_full(config_path: &Path) -> Result<()> {
    let config = load_config(Some(config_path))?;
    let control = RunControl::unbounded();
    let result = run_pipeline(&config, &control)?;
    print_summary(&result);

    let run_dir = save_artifacts(&result, &config)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn print_summary(result: &PipelineResult) {
    let m = &result.metrics;
    println!("run {}", short_id(&result.run_id));
    println!("  candles          {}", result.candle_count);
    println!(
        "  permitted days   {}",
        result.permissions.iter().filter(|p| p.permitted).count()
    );
    println!("  trades           {}", m.trade_count);
    println!("  open at end      {}", m.open_positions_at_end);
    println!("  final equity     {:.2}", m.final_equity);
    println!("  win rate         {:.1}%", m.win_rate * 100.0);
    println!("  max drawdown     {:.2}%", m.max_drawdown * 100.0);
    println!("  replenished      {:.2}", m.total_replenished);
    println!(
        "  audit            {}",
        if result.audit.flags.accounting_breach {
            "BREACH"
        } else {
            "clean"
        }
    );
    if let Some(note) = &result.audit.note {
        println!("  note             {note}");
    }
}

fn run_sweep_cmd(
    config_path: &Path,
    grid_path: &Path,
    output_dir: &Path,
    parallel: bool,
    per_run: bool,
) -> Result<()> {
    let config = load_config(Some(config_path))?;
    let grid = ParamGrid::load(grid_path)?;
    let candles = load_hourly(&config.data.hourly_path, &config)?;
    let permissions = match &config.data.signals_path {
        Some(path) => load_permissions(path)?,
        None => generate_daily_signals(&candles, &config.signals)?.permissions(),
    };

    println!("sweeping {} combinations", grid.size());
    let results = run_sweep(
        &candles,
        &permissions,
        &config.execution,
        &grid,
        parallel,
        &RunControl::unbounded(),
    )?;
    let summary = save_sweep(&results, output_dir, per_run)?;

    let breaches = results.all().iter().filter(|r| r.row.accounting_breach).count();
    println!(
        "{} runs, {} with accounting breach → {}",
        results.len(),
        breaches,
        summary.display()
    );
    Ok(())
}

fn run_synth(
    scenario: &str,
    output_dir: &Path,
    hours: usize,
    base_price: f64,
    seed: u64,
) -> Result<()> {
    let scenarios: Vec<Scenario> = if scenario == "all" {
        Scenario::ALL.to_vec()
    } else {
        match Scenario::parse(scenario) {
            Some(s) => vec![s],
            None => bail!(
                "unknown scenario '{scenario}'. \
                 Valid: flash_crash, deep_bleed, chop_tight, chop_wild, all"
            ),
        }
    };
    if hours == 0 {
        bail!("--hours must be positive");
    }

    let spec = SyntheticSpec {
        hours,
        base_price,
        seed,
        ..SyntheticSpec::default()
    };
    for sc in scenarios {
        let candles = generate(sc, &spec);
        let path = output_dir.join(format!("{}.csv", sc.name()));
        write_output(&path, &artifacts::candles_csv(&candles)?)?;
        println!("{sc}: {} hours → {}", candles.len(), path.display());
    }
    Ok(())
}

fn run_stress(hours: usize, seed: u64, parallel: bool, output: Option<&Path>) -> Result<()> {
    let spec = SyntheticSpec {
        hours,
        seed,
        ..SyntheticSpec::default()
    };
    let outcomes = run_stress_battery(&spec, parallel, &RunControl::unbounded())?;

    for o in &outcomes {
        println!(
            "{:<12} trades {:>4}  open {:>2}  equity {:>12.2}  max dd {:>7.2}%  stuck {:>5.1}%  {}",
            o.scenario.name(),
            o.trade_count,
            o.open_positions,
            o.final_equity,
            o.metrics.max_drawdown * 100.0,
            o.metrics.stuck_pct,
            if o.passed() { "PASS" } else { "BREACH" }
        );
    }
    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcomes).context("serializing stress outcomes")?;
        write_output(path, &json)?;
    }

    if outcomes.iter().any(|o| !o.passed()) {
        bail!("accounting breach in stress battery");
    }
    Ok(())
}

fn run_analyze_sweep(summary: &Path, output: &Path) -> Result<()> {
    let rows = read_sweep_summary(summary)
        .with_context(|| format!("reading sweep summary {}", summary.display()))?;
    let analysis = analyze_sweep(&rows);

    for edge in &analysis.high_sensitivity_edges {
        println!(
            "edge      {:<18} {} → {}  drawdown {:+.1}%",
            edge.parameter.name(),
            edge.from_value,
            edge.to_value,
            edge.change_pct
        );
    }
    for (param, zone) in &analysis.low_variance_zones {
        println!(
            "stable    {:<18} [{}, {}]  cv {:.3}",
            param, zone.range[0], zone.range[1], zone.coefficient_of_variation
        );
    }
    for param in &analysis.high_variance_parameters {
        println!("volatile  {}", param.name());
    }

    let json = serde_json::to_string_pretty(&analysis).context("serializing sweep analysis")?;
    write_output(output, &json)?;
    println!(
        "{} combinations analysed → {}",
        analysis.total_combinations,
        output.display()
    );
    Ok(())
}

fn run_analyze_regimes(config_path: &Path, output: &Path) -> Result<()> {
    let config = load_config(Some(config_path))?;
    let candles = load_hourly(&config.data.hourly_path, &config)?;
    let permissions = match &config.data.signals_path {
        Some(path) => load_permissions(path)?,
        None => generate_daily_signals(&candles, &config.signals)?.permissions(),
    };

    let comparison = compare_regimes(
        &candles,
        &permissions,
        &config.execution,
        &RunControl::unbounded(),
    )?;
    for w in &comparison.windows {
        println!(
            "{:<18} {} → {}  trades {:>4}  max dd {:>7.2}%  stuck {:>5.1}%  losers {:>5.1}%",
            w.regime.name(),
            w.start,
            w.end,
            w.metrics.total_trades,
            w.metrics.max_drawdown * 100.0,
            w.metrics.stuck_pct,
            w.metrics.negative_pnl_pct
        );
    }
    for (regime, days) in &comparison.insufficient {
        println!("{:<18} skipped ({days} days)", regime.name());
    }

    let json =
        serde_json::to_string_pretty(&comparison).context("serializing regime comparison")?;
    write_output(output, &json)?;
    println!("Regime comparison saved to: {}", output.display());
    Ok(())
}
