//! Signal stage: hourly candles → one permission row per complete UTC day.
//!
//! Pipeline: daily aggregation (complete days only) → moving average, RSI,
//! running peak and drawdown on daily closes → condition evaluation.
//!
//! A day is permitted iff `close > ma_value`, the RSI passes the configured
//! comparison against `rsi_threshold`, and, when a `drawdown_floor` is
//! configured, `drawdown > drawdown_floor`. Undefined indicator values fail
//! their condition.

use crate::config::{check_finite, check_nonzero, ConfigError};
use crate::data::{aggregate_daily, DroppedDay};
use crate::domain::{Candle, DailyPermission};
use crate::indicators::{drawdown, ema, rsi, running_peak, sma, RsiSmoothing};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaType {
    #[default]
    Sma,
    Ema,
}

/// Direction of the RSI gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiComparison {
    /// Permit while `rsi < threshold` (overbought exclusion).
    #[default]
    Below,
    /// Permit while `rsi > threshold`.
    Above,
}

impl RsiComparison {
    fn passes(self, rsi: f64, threshold: f64) -> bool {
        match self {
            RsiComparison::Below => rsi < threshold,
            RsiComparison::Above => rsi > threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub ma_period: usize,
    pub ma_type: MaType,
    pub rsi_period: usize,
    pub rsi_threshold: f64,
    pub rsi_comparison: RsiComparison,
    pub rsi_smoothing: RsiSmoothing,
    /// Gate on `drawdown > floor` when set; drawdown is context-only otherwise.
    pub drawdown_floor: Option<f64>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            ma_period: 50,
            ma_type: MaType::Sma,
            rsi_period: 14,
            rsi_threshold: 70.0,
            rsi_comparison: RsiComparison::Below,
            rsi_smoothing: RsiSmoothing::Wilder,
            drawdown_floor: None,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("signals.ma_period", self.ma_period)?;
        check_nonzero("signals.rsi_period", self.rsi_period)?;
        check_finite("signals.rsi_threshold", self.rsi_threshold)?;
        if !(0.0..=100.0).contains(&self.rsi_threshold) {
            return Err(ConfigError::OutOfRange {
                field: "signals.rsi_threshold",
                reason: format!("{} is outside [0, 100]", self.rsi_threshold),
            });
        }
        if let Some(floor) = self.drawdown_floor {
            check_finite("signals.drawdown_floor", floor)?;
            if !(-1.0..=0.0).contains(&floor) {
                return Err(ConfigError::OutOfRange {
                    field: "signals.drawdown_floor",
                    reason: format!("{floor} is outside [-1, 0]"),
                });
            }
        }
        Ok(())
    }
}

/// Why a day was not permitted. A day may carry several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonFlag {
    BelowMa,
    RsiRejected,
    DrawdownBreach,
}

impl ReasonFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonFlag::BelowMa => "below_ma",
            ReasonFlag::RsiRejected => "rsi_rejected",
            ReasonFlag::DrawdownBreach => "drawdown_breach",
        }
    }
}

impl fmt::Display for ReasonFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluated day with its diagnostic indicator values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySignal {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ma_value: f64,
    pub rsi: f64,
    pub peak: f64,
    pub drawdown: f64,
    pub permitted: bool,
    pub reason_flags: Vec<ReasonFlag>,
}

impl DailySignal {
    pub fn to_permission(&self) -> DailyPermission {
        DailyPermission {
            date: self.date,
            permitted: self.permitted,
            reference_close: self.close,
            ma_value: self.ma_value,
        }
    }

    /// Flags joined with `;`, empty when permitted.
    pub fn reason_string(&self) -> String {
        self.reason_flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalOutput {
    pub signals: Vec<DailySignal>,
    pub dropped_days: Vec<DroppedDay>,
}

impl SignalOutput {
    pub fn permissions(&self) -> Vec<DailyPermission> {
        self.signals.iter().map(DailySignal::to_permission).collect()
    }

    pub fn permitted_count(&self) -> usize {
        self.signals.iter().filter(|s| s.permitted).count()
    }
}

pub fn generate_daily_signals(
    candles: &[Candle],
    config: &SignalConfig,
) -> Result<SignalOutput, ConfigError> {
    config.validate()?;

    let agg = aggregate_daily(candles);
    let closes = agg.closes();

    let ma = match config.ma_type {
        MaType::Sma => sma(&closes, config.ma_period),
        MaType::Ema => ema(&closes, config.ma_period),
    };
    let rsi_values = rsi(&closes, config.rsi_period, config.rsi_smoothing);
    let peaks = running_peak(&closes);
    let drawdowns = drawdown(&closes);

    let signals: Vec<DailySignal> = agg
        .days
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let mut reason_flags = Vec::new();

            // NaN comparisons are false, so warmup days fail their conditions
            let above_ma = day.close > ma[i];
            if !above_ma {
                reason_flags.push(ReasonFlag::BelowMa);
            }
            if !config
                .rsi_comparison
                .passes(rsi_values[i], config.rsi_threshold)
            {
                reason_flags.push(ReasonFlag::RsiRejected);
            }
            if let Some(floor) = config.drawdown_floor {
                let above_floor = drawdowns[i] > floor;
                if !above_floor {
                    reason_flags.push(ReasonFlag::DrawdownBreach);
                }
            }

            DailySignal {
                date: day.date,
                open: day.open,
                high: day.high,
                low: day.low,
                close: day.close,
                volume: day.volume,
                ma_value: ma[i],
                rsi: rsi_values[i],
                peak: peaks[i],
                drawdown: drawdowns[i],
                permitted: reason_flags.is_empty(),
                reason_flags,
            }
        })
        .collect();

    let output = SignalOutput {
        signals,
        dropped_days: agg.dropped_days,
    };
    tracing::info!(
        days = output.signals.len(),
        permitted = output.permitted_count(),
        dropped = output.dropped_days.len(),
        "daily signals generated"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly candles where every hour of day `d` closes at `daily_closes[d]`.
    fn flat_days(daily_closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut out = Vec::new();
        for (d, &close) in daily_closes.iter().enumerate() {
            for h in 0..24 {
                out.push(Candle {
                    timestamp: start + Duration::hours((d * 24 + h) as i64),
                    open: close,
                    high: close * 1.001,
                    low: close * 0.999,
                    close,
                    volume: 10.0,
                });
            }
        }
        out
    }

    fn small_config() -> SignalConfig {
        SignalConfig {
            ma_period: 3,
            rsi_period: 2,
            rsi_threshold: 70.0,
            ..SignalConfig::default()
        }
    }

    #[test]
    fn warmup_days_are_not_permitted() {
        let out = generate_daily_signals(&flat_days(&[100.0, 101.0, 99.0, 102.0]), &small_config())
            .unwrap();
        assert_eq!(out.signals.len(), 4);
        assert!(out.signals[0].ma_value.is_nan());
        assert!(out.signals[1].ma_value.is_nan());
        assert!(!out.signals[0].permitted);
        assert!(out.signals[0].reason_flags.contains(&ReasonFlag::BelowMa));
        assert!(out.signals[0].reason_flags.contains(&ReasonFlag::RsiRejected));
    }

    #[test]
    fn permits_above_ma_with_moderate_rsi() {
        let out = generate_daily_signals(
            &flat_days(&[100.0, 104.0, 99.0, 102.0]),
            &small_config(),
        )
        .unwrap();
        let day = &out.signals[3];
        // sma(104, 99, 102) = 101.67; Wilder RSI(2) = 66.7
        assert!(day.close > day.ma_value);
        assert!(day.rsi < 70.0);
        assert!(day.permitted, "flags: {:?}", day.reason_flags);
        assert_eq!(day.reason_string(), "");
        assert_eq!(out.permitted_count(), 1);

        let perm = day.to_permission();
        assert!(perm.permitted);
        assert_eq!(perm.reference_close, 102.0);
    }

    #[test]
    fn rsi_comparison_direction_is_configurable() {
        let candles = flat_days(&[100.0, 104.0, 99.0, 102.0]);
        let config = SignalConfig {
            rsi_comparison: RsiComparison::Above,
            ..small_config()
        };
        let out = generate_daily_signals(&candles, &config).unwrap();
        assert!(!out.signals[3].permitted);
        assert_eq!(out.signals[3].reason_flags, vec![ReasonFlag::RsiRejected]);
    }

    #[test]
    fn drawdown_floor_gates_only_when_configured() {
        let candles = flat_days(&[100.0, 104.0, 99.0, 102.0]);
        let config = SignalConfig {
            drawdown_floor: Some(-0.01),
            ..small_config()
        };
        let out = generate_daily_signals(&candles, &config).unwrap();
        // drawdown at day 3 = 102/104 - 1 ≈ -1.9%
        assert!(out.signals[3].drawdown < -0.01);
        assert!(!out.signals[3].permitted);
        assert_eq!(out.signals[3].reason_flags, vec![ReasonFlag::DrawdownBreach]);
        assert_eq!(out.signals[3].peak, 104.0);
    }

    #[test]
    fn incomplete_days_are_dropped() {
        let mut candles = flat_days(&[100.0, 101.0, 102.0]);
        candles.truncate(24 * 2 + 5);
        let out = generate_daily_signals(&candles, &small_config()).unwrap();
        assert_eq!(out.signals.len(), 2);
        assert_eq!(out.dropped_days.len(), 1);
        assert_eq!(out.dropped_days[0].candle_count, 5);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = SignalConfig {
            ma_period: 0,
            ..SignalConfig::default()
        };
        assert_eq!(
            generate_daily_signals(&[], &config),
            Err(ConfigError::Zero {
                field: "signals.ma_period"
            })
        );
    }
}
