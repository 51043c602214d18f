//! Robustness analysis: how sensitive a sweep's drawdown is to each
//! parameter, and how the strategy behaves across market regimes.
//!
//! Sweep analysis works on `SweepRow`s, so it runs the same on a fresh
//! `SweepResults` or on a re-read `sweep_summary.csv`. Drawdowns are compared
//! as magnitudes.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use diplab_core::data::{aggregate_daily, DailyBar};
use diplab_core::domain::{Candle, DailyPermission};
use diplab_core::engine::{run_execution, ExecutionConfig, ExecutionError, RunControl};
use diplab_core::indicators::sma;

use crate::metrics::PeriodMetrics;
use crate::sweep::SweepRow;

/// Change in mean drawdown between neighbouring grid values that marks an edge.
pub const SENSITIVITY_EDGE_PCT: f64 = 50.0;
pub const LOW_VARIANCE_CV: f64 = 0.20;
pub const HIGH_VARIANCE_CV: f64 = 0.50;

pub const REGIME_WINDOW_DAYS: usize = 90;
pub const TREND_SMA_PERIOD: usize = 50;
/// Days over which the trend SMA's slope is measured.
pub const TREND_SLOPE_LAG: usize = 10;
pub const TREND_SLOPE_THRESHOLD: f64 = 0.02;
/// Lower and upper quantiles for the range and volume regimes.
pub const REGIME_QUANTILES: (f64, f64) = (0.20, 0.80);

// ─── Sweep sensitivity ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParam {
    DipPct,
    TslTrigger,
    TslDistance,
    MaxHoldDays,
    MonthlyDcaAmount,
}

impl SweepParam {
    pub const ALL: [SweepParam; 5] = [
        SweepParam::DipPct,
        SweepParam::TslTrigger,
        SweepParam::TslDistance,
        SweepParam::MaxHoldDays,
        SweepParam::MonthlyDcaAmount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepParam::DipPct => "dip_pct",
            SweepParam::TslTrigger => "tsl_trigger",
            SweepParam::TslDistance => "tsl_distance",
            SweepParam::MaxHoldDays => "max_hold_days",
            SweepParam::MonthlyDcaAmount => "monthly_dca_amount",
        }
    }

    pub fn value(self, row: &SweepRow) -> f64 {
        match self {
            SweepParam::DipPct => row.dip_pct,
            SweepParam::TslTrigger => row.tsl_trigger,
            SweepParam::TslDistance => row.tsl_distance,
            SweepParam::MaxHoldDays => f64::from(row.max_hold_days),
            SweepParam::MonthlyDcaAmount => row.monthly_dca_amount,
        }
    }
}

/// Neighbouring grid values whose mean drawdowns differ sharply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEdge {
    pub parameter: SweepParam,
    pub from_value: f64,
    pub to_value: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceZone {
    pub range: [f64; 2],
    pub coefficient_of_variation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepAnalysis {
    pub high_sensitivity_edges: Vec<SensitivityEdge>,
    /// Keyed by parameter name.
    pub low_variance_zones: BTreeMap<String, VarianceZone>,
    pub high_variance_parameters: Vec<SweepParam>,
    pub total_combinations: usize,
}

/// Population coefficient of variation. `None` for fewer than two values or
/// a non-positive mean.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.is_nan() || mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

/// Mean drawdown magnitude per distinct value of `param`, ascending by value.
fn drawdown_by_value(rows: &[SweepRow], param: SweepParam) -> Vec<(f64, f64)> {
    let mut pairs: Vec<(f64, f64)> = rows
        .iter()
        .map(|r| (param.value(r), r.max_drawdown.abs()))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut groups: Vec<(f64, f64, usize)> = Vec::new();
    for (value, dd) in pairs {
        match groups.last_mut() {
            Some((v, sum, n)) if *v == value => {
                *sum += dd;
                *n += 1;
            }
            _ => groups.push((value, dd, 1)),
        }
    }
    groups
        .into_iter()
        .map(|(value, sum, n)| (value, sum / n as f64))
        .collect()
}

/// Sensitivity of max drawdown to every swept parameter. Parameters held at
/// a single value are skipped.
pub fn analyze_sweep(rows: &[SweepRow]) -> SweepAnalysis {
    let mut analysis = SweepAnalysis {
        total_combinations: rows.len(),
        ..SweepAnalysis::default()
    };

    for param in SweepParam::ALL {
        let means = drawdown_by_value(rows, param);

        for pair in means.windows(2) {
            let ((from_value, before), (to_value, after)) = (pair[0], pair[1]);
            if before <= 0.0 {
                continue;
            }
            let change_pct = ((after - before) / before).abs() * 100.0;
            if change_pct > SENSITIVITY_EDGE_PCT {
                analysis.high_sensitivity_edges.push(SensitivityEdge {
                    parameter: param,
                    from_value,
                    to_value,
                    change_pct,
                });
            }
        }

        let drawdowns: Vec<f64> = means.iter().map(|&(_, dd)| dd).collect();
        let Some(cv) = coefficient_of_variation(&drawdowns) else {
            continue;
        };
        if cv < LOW_VARIANCE_CV {
            analysis.low_variance_zones.insert(
                param.name().to_string(),
                VarianceZone {
                    range: [means[0].0, means[means.len() - 1].0],
                    coefficient_of_variation: cv,
                },
            );
        }
        if cv > HIGH_VARIANCE_CV {
            analysis.high_variance_parameters.push(param);
        }
    }

    tracing::info!(
        combinations = analysis.total_combinations,
        edges = analysis.high_sensitivity_edges.len(),
        stable = analysis.low_variance_zones.len(),
        volatile = analysis.high_variance_parameters.len(),
        "sweep analysis done"
    );
    analysis
}

// ─── Market regimes ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    HighVolatility,
    LowVolatility,
    UpwardTrending,
    DownwardTrending,
    HighLiquidity,
    LowLiquidity,
}

impl Regime {
    pub const ALL: [Regime; 6] = [
        Regime::HighVolatility,
        Regime::LowVolatility,
        Regime::UpwardTrending,
        Regime::DownwardTrending,
        Regime::HighLiquidity,
        Regime::LowLiquidity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Regime::HighVolatility => "high_volatility",
            Regime::LowVolatility => "low_volatility",
            Regime::UpwardTrending => "upward_trending",
            Regime::DownwardTrending => "downward_trending",
            Regime::HighLiquidity => "high_liquidity",
            Regime::LowLiquidity => "low_liquidity",
        }
    }
}

/// Linearly interpolated quantile, NaNs ignored.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Dates in each regime, ascending. A day can sit in several regimes.
///
/// Volatility is the daily high-low range, trend is the 10-day change of
/// the 50-day close SMA, liquidity is daily volume.
pub fn classify_regimes(days: &[DailyBar]) -> BTreeMap<Regime, Vec<NaiveDate>> {
    let mut regimes: BTreeMap<Regime, Vec<NaiveDate>> =
        Regime::ALL.iter().map(|&r| (r, Vec::new())).collect();

    let ranges: Vec<f64> = days.iter().map(|d| d.high - d.low).collect();
    let volumes: Vec<f64> = days.iter().map(|d| d.volume).collect();
    let closes: Vec<f64> = days.iter().map(|d| d.close).collect();
    let trend = sma(&closes, TREND_SMA_PERIOD);

    let (lo_q, hi_q) = REGIME_QUANTILES;
    let (Some(range_lo), Some(range_hi), Some(volume_lo), Some(volume_hi)) = (
        quantile(&ranges, lo_q),
        quantile(&ranges, hi_q),
        quantile(&volumes, lo_q),
        quantile(&volumes, hi_q),
    ) else {
        return regimes;
    };

    for (i, day) in days.iter().enumerate() {
        let slope = if i >= TREND_SLOPE_LAG {
            trend[i] / trend[i - TREND_SLOPE_LAG] - 1.0
        } else {
            f64::NAN
        };

        let tags = [
            (Regime::HighVolatility, ranges[i] > range_hi),
            (Regime::LowVolatility, ranges[i] < range_lo),
            (Regime::UpwardTrending, slope > TREND_SLOPE_THRESHOLD),
            (Regime::DownwardTrending, slope < -TREND_SLOPE_THRESHOLD),
            (Regime::HighLiquidity, volumes[i] > volume_hi),
            (Regime::LowLiquidity, volumes[i] < volume_lo),
        ];
        for (regime, hit) in tags {
            if hit {
                regimes.entry(regime).or_default().push(day.date);
            }
        }
    }
    regimes
}

/// The first `REGIME_WINDOW_DAYS` days of a regime and the run over the
/// hours they span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeWindow {
    pub regime: Regime,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub window_days: usize,
    pub hours: usize,
    pub metrics: PeriodMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeVariance {
    pub max_drawdown_cv: f64,
    pub max_drawdown_range: [f64; 2],
    pub regime_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeComparison {
    pub windows: Vec<RegimeWindow>,
    /// Regimes with too few days for a window, and how many they had.
    pub insufficient: Vec<(Regime, usize)>,
    pub variance: Option<RegimeVariance>,
}

/// Hours from `start` 00:00 through `end` 23:00 of an ascending series.
fn hours_between(candles: &[Candle], start: NaiveDate, end: NaiveDate) -> &[Candle] {
    let from = candles.partition_point(|c| c.day() < start);
    let to = candles.partition_point(|c| c.day() <= end);
    &candles[from..to]
}

/// Run the simulator over one window per regime and compare drawdowns.
pub fn compare_regimes(
    candles: &[Candle],
    permissions: &[DailyPermission],
    config: &ExecutionConfig,
    control: &RunControl,
) -> Result<RegimeComparison, ExecutionError> {
    let daily = aggregate_daily(candles);
    let mut comparison = RegimeComparison::default();

    for (regime, dates) in classify_regimes(&daily.days) {
        if dates.len() < REGIME_WINDOW_DAYS {
            tracing::warn!(
                regime = regime.name(),
                days = dates.len(),
                "not enough days for a regime window"
            );
            comparison.insufficient.push((regime, dates.len()));
            continue;
        }

        let (start, end) = (dates[0], dates[REGIME_WINDOW_DAYS - 1]);
        let hours = hours_between(candles, start, end);
        let result = run_execution(hours, permissions, config, control)?;
        let metrics = PeriodMetrics::compute(&result, config.max_hold_days);
        tracing::info!(
            regime = regime.name(),
            %start,
            %end,
            trades = metrics.total_trades,
            max_drawdown = metrics.max_drawdown,
            "regime window done"
        );

        comparison.windows.push(RegimeWindow {
            regime,
            start,
            end,
            window_days: REGIME_WINDOW_DAYS,
            hours: hours.len(),
            metrics,
        });
    }

    let drawdowns: Vec<f64> = comparison
        .windows
        .iter()
        .map(|w| w.metrics.max_drawdown.abs())
        .collect();
    if !drawdowns.is_empty() {
        comparison.variance = Some(RegimeVariance {
            max_drawdown_cv: coefficient_of_variation(&drawdowns).unwrap_or(0.0),
            max_drawdown_range: [
                drawdowns.iter().copied().fold(f64::INFINITY, f64::min),
                drawdowns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ],
            regime_count: drawdowns.len(),
        });
    }

    Ok(comparison)
}
