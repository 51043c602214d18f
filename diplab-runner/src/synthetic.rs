//! Deterministic synthetic hourly series for stress-testing the simulator.
//!
//! Every scenario shares a mechanical daily cycle that forces an entry and a
//! trailing-stop exit each day:
//!
//! | hour | move  |
//! |------|-------|
//! | 00   | +10%  |
//! | 01   | −10%  |
//! | 12   | +15%  |
//! | 18   | −15%  |
//!
//! Other hours take a uniform noise step, replaced by the scenario's stress
//! move inside its stress window. Seeds are derived per scenario with BLAKE3,
//! so a scenario's series does not depend on which others are generated.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use diplab_core::domain::{Candle, DailyPermission};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// −8% per hour for hours 601..=609.
    FlashCrash,
    /// −1% per hour for hours 601..=899.
    DeepBleed,
    ChopTight,
    ChopWild,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::FlashCrash,
        Scenario::DeepBleed,
        Scenario::ChopTight,
        Scenario::ChopWild,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::FlashCrash => "flash_crash",
            Scenario::DeepBleed => "deep_bleed",
            Scenario::ChopTight => "chop_tight",
            Scenario::ChopWild => "chop_wild",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|sc| sc.name() == s.trim().to_ascii_lowercase())
    }

    /// Half-width of the uniform noise step.
    fn noise(self) -> f64 {
        match self {
            Scenario::ChopWild => 0.03,
            _ => 0.0087,
        }
    }

    fn stress_move(self, hour_index: usize) -> Option<f64> {
        match self {
            Scenario::FlashCrash if (601..610).contains(&hour_index) => Some(-0.08),
            Scenario::DeepBleed if (601..900).contains(&hour_index) => Some(-0.01),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a generated series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSpec {
    pub hours: usize,
    pub base_price: f64,
    pub seed: u64,
    pub start: DateTime<Utc>,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            hours: 1500,
            base_price: 10_000.0,
            seed: 42,
            start: Utc
                .with_ymd_and_hms(2017, 10, 20, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

fn scenario_rng(seed: u64, scenario: Scenario) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(scenario.name().as_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

fn close_path(scenario: Scenario, spec: &SyntheticSpec) -> Vec<f64> {
    let mut rng = scenario_rng(spec.seed, scenario);
    let noise = scenario.noise();
    let mut closes = Vec::with_capacity(spec.hours);
    let mut price = spec.base_price;

    for i in 0..spec.hours {
        if i > 0 {
            let change = match i % 24 {
                0 => 0.10,
                1 => -0.10,
                12 => 0.15,
                18 => -0.15,
                _ => {
                    // drawn even inside the stress window
                    let step = rng.gen_range(-noise..=noise);
                    scenario.stress_move(i).unwrap_or(step)
                }
            };
            price *= 1.0 + change;
        }
        closes.push(price);
    }
    closes
}

/// Generate the hourly candles of one scenario.
///
/// Open is the previous close (the base price for the first hour); high and
/// low widen the open/close range by 0.2% on each side.
pub fn generate(scenario: Scenario, spec: &SyntheticSpec) -> Vec<Candle> {
    let closes = close_path(scenario, spec);
    let mut prev_close = spec.base_price;

    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev_close;
            prev_close = close;
            Candle {
                timestamp: spec.start + Duration::hours(i as i64),
                open,
                high: open.max(close) * 1.002,
                low: open.min(close) * 0.998,
                close,
                volume: 1_000.0,
            }
        })
        .collect()
}

/// Every day from `from` to `to` inclusive, permitted, with fixed indicator values.
pub fn all_permitted(from: NaiveDate, to: NaiveDate, close: f64, ma: f64) -> Vec<DailyPermission> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .map(|date| DailyPermission {
            date,
            permitted: true,
            reference_close: close,
            ma_value: ma,
        })
        .collect()
}
