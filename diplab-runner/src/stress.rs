//! Stress battery: every synthetic scenario through the simulator with an
//! aggressive config, each run audited.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use diplab_core::engine::{
    audit, run_execution, AuditReport, ExecutionConfig, ExecutionError, RunControl,
};

use crate::metrics::{PeriodMetrics, RunMetrics};
use crate::synthetic::{all_permitted, generate, Scenario, SyntheticSpec};

/// Hair-trigger settings: enter at the prior close, arm and trail at 1%,
/// and treat anything older than a day as stuck.
pub fn stress_execution_config() -> ExecutionConfig {
    ExecutionConfig {
        dip_pct: 0.0,
        tsl_trigger: 0.01,
        tsl_distance: 0.01,
        max_hold_days: 1,
        initial_capital: 50_000.0,
        monthly_dca_amount: 1_000.0,
        max_steps: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressOutcome {
    pub scenario: Scenario,
    pub candles: usize,
    pub trade_count: usize,
    pub open_positions: usize,
    pub final_equity: f64,
    pub metrics: PeriodMetrics,
    pub audit: AuditReport,
}

impl StressOutcome {
    pub fn passed(&self) -> bool {
        !self.audit.flags.accounting_breach
    }
}

/// Run one scenario with every day permitted.
pub fn run_scenario(
    scenario: Scenario,
    spec: &SyntheticSpec,
    config: &ExecutionConfig,
    control: &RunControl,
) -> Result<StressOutcome, ExecutionError> {
    let candles = generate(scenario, spec);
    let permissions = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => all_permitted(
            first.day(),
            last.day(),
            spec.base_price,
            spec.base_price * 0.95,
        ),
        _ => Vec::new(),
    };

    let result = run_execution(&candles, &permissions, config, control)?;
    let report = audit(&result.trades, &result.ledger);
    let metrics = RunMetrics::compute(&result);
    let period = PeriodMetrics::compute(&result, config.max_hold_days);

    tracing::info!(
        scenario = scenario.name(),
        trades = metrics.trade_count,
        final_equity = metrics.final_equity,
        breach = report.flags.accounting_breach,
        "stress scenario done"
    );

    Ok(StressOutcome {
        scenario,
        candles: candles.len(),
        trade_count: metrics.trade_count,
        open_positions: metrics.open_positions_at_end,
        final_equity: metrics.final_equity,
        metrics: period,
        audit: report,
    })
}

/// Run all scenarios, one outcome per scenario in `Scenario::ALL` order.
pub fn run_stress_battery(
    spec: &SyntheticSpec,
    parallel: bool,
    control: &RunControl,
) -> Result<Vec<StressOutcome>, ExecutionError> {
    let config = stress_execution_config();
    if parallel {
        Scenario::ALL
            .par_iter()
            .map(|&sc| run_scenario(sc, spec, &config, control))
            .collect()
    } else {
        Scenario::ALL
            .iter()
            .map(|&sc| run_scenario(sc, spec, &config, control))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stress_config_is_valid() {
        stress_execution_config().validate().unwrap();
    }

    #[test]
    fn battery_trades_every_scenario() {
        let outcomes =
            run_stress_battery(&SyntheticSpec::default(), false, &RunControl::unbounded()).unwrap();
        assert_eq!(outcomes.len(), Scenario::ALL.len());
        for (outcome, scenario) in outcomes.iter().zip(Scenario::ALL) {
            assert_eq!(outcome.scenario, scenario);
            assert_eq!(outcome.candles, 1500);
            assert!(outcome.trade_count > 0, "{scenario}: no trades");
            assert_eq!(outcome.metrics.total_trades, outcome.trade_count);
            assert!(outcome.metrics.avg_duration_hours > 0.0);
            assert!((0.0..=100.0).contains(&outcome.metrics.stuck_pct));
            assert!((0.0..=1.0 + 1e-9).contains(&outcome.metrics.capital_utilization_mean));
            assert_eq!(outcome.audit.counters.negative_balance_observed, 0);
            assert_eq!(outcome.audit.counters.broken_invariants_observed, 0);
        }
    }

    #[test]
    fn outcome_metrics_describe_the_run() {
        let spec = SyntheticSpec::default();
        let config = stress_execution_config();
        let control = RunControl::unbounded();
        let outcome = run_scenario(Scenario::FlashCrash, &spec, &config, &control).unwrap();

        let candles = generate(Scenario::FlashCrash, &spec);
        let permissions = all_permitted(
            candles[0].day(),
            candles[candles.len() - 1].day(),
            spec.base_price,
            spec.base_price * 0.95,
        );
        let result = run_execution(&candles, &permissions, &config, &control).unwrap();
        assert_eq!(outcome.metrics, PeriodMetrics::compute(&result, config.max_hold_days));
        assert!(outcome.metrics.max_drawdown <= 0.0);
        assert!(outcome.metrics.max_dd_duration_hours <= outcome.candles);
    }

    #[test]
    fn parallel_matches_serial() {
        let spec = SyntheticSpec {
            hours: 400,
            ..SyntheticSpec::default()
        };
        let serial = run_stress_battery(&spec, false, &RunControl::unbounded()).unwrap();
        let parallel = run_stress_battery(&spec, true, &RunControl::unbounded()).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn budget_stops_the_battery() {
        let err = run_stress_battery(
            &SyntheticSpec::default(),
            true,
            &RunControl::unbounded().with_max_steps(100),
        )
        .unwrap_err();
        assert_eq!(err, ExecutionError::BudgetExhausted { budget: 100 });
    }
}
