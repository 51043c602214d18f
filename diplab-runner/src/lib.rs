//! DipLab Runner — pipeline orchestration on top of `diplab-core`.
//!
//! This crate provides:
//! - TOML configuration with a content-addressed run id
//! - CSV loading of hourly candles and daily permissions
//! - The single-run pipeline and its artifact set
//! - Parameter sweeps (rayon)
//! - Synthetic stress scenarios and the stress battery
//! - Sweep sensitivity and market-regime analysis

pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod data_loader;
pub mod metrics;
pub mod runner;
pub mod stress;
pub mod sweep;
pub mod synthetic;

pub use analysis::{
    analyze_sweep, compare_regimes, Regime, RegimeComparison, SweepAnalysis, SweepParam,
};
pub use artifacts::{audit_artifacts, read_sweep_summary, ArtifactError};
pub use config::{short_id, BacktestConfig, RunId};
pub use data_loader::{dataset_hash, load_candles, load_permissions, LoadError};
pub use metrics::{PeriodMetrics, RunMetrics};
pub use runner::{run_on_data, run_pipeline, save_artifacts, Manifest, PipelineResult, RunError};
pub use stress::{run_stress_battery, stress_execution_config, StressOutcome};
pub use sweep::{run_sweep, save_sweep, ParamGrid, SweepError, SweepResults, SweepRow};
pub use synthetic::{all_permitted, generate, Scenario, SyntheticSpec};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
    }

    #[test]
    fn sweep_types_are_send_sync() {
        assert_send::<ParamGrid>();
        assert_sync::<ParamGrid>();
        assert_send::<SweepRow>();
        assert_sync::<SweepRow>();
        assert_send::<SweepError>();
    }

    #[test]
    fn results_are_send_sync() {
        assert_send::<PipelineResult>();
        assert_sync::<PipelineResult>();
        assert_send::<RunMetrics>();
        assert_sync::<RunMetrics>();
        assert_send::<StressOutcome>();
        assert_sync::<StressOutcome>();
        assert_send::<SweepAnalysis>();
        assert_sync::<SweepAnalysis>();
        assert_send::<RegimeComparison>();
        assert_sync::<RegimeComparison>();
    }
}
