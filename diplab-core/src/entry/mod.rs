//! Entry scan: one dip entry per permitted signal day.
//!
//! For each day D whose previous day D−1 is permitted, walk D's hours in
//! order and take the first one whose low reaches
//! `target = reference × (1 − dip_pct)`. A gap-down open fills at the open,
//! anything else fills at the target.

use crate::config::{check_fraction, ConfigError};
use crate::domain::{Candle, PermissionMap};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which permission field the dip target is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    #[default]
    Close,
    MovingAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryConfig {
    pub dip_pct: f64,
    pub reference: ReferenceKind,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            dip_pct: 0.02,
            reference: ReferenceKind::Close,
        }
    }
}

impl EntryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("entry.dip_pct", self.dip_pct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillKind {
    /// Opened at or below the target; filled at the open.
    Gap,
    /// Traded down through the target intrabar; filled at the target.
    Limit,
}

/// Dip-fill price for one candle, or `None` if the target was not reached.
pub fn dip_fill(candle: &Candle, target: f64) -> Option<(f64, FillKind)> {
    if candle.open <= target {
        Some((candle.open, FillKind::Gap))
    } else if candle.low <= target {
        Some((target, FillKind::Limit))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub signal_date: NaiveDate,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub reference_price: f64,
    pub target_price: f64,
    pub fill: FillKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryScanSummary {
    /// Permitted signal days whose following day is present in the data.
    pub eligible_signals: usize,
    pub entries_found: usize,
    /// Eligible signals whose following day never reached the target.
    pub missed_signals: usize,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryScan {
    pub entries: Vec<Entry>,
    pub summary: EntryScanSummary,
}

pub fn find_entries(
    candles: &[Candle],
    permissions: &PermissionMap,
    config: &EntryConfig,
) -> Result<EntryScan, ConfigError> {
    config.validate()?;

    let mut entries = Vec::new();
    let mut consumed: HashSet<NaiveDate> = HashSet::new();
    let mut eligible: HashSet<NaiveDate> = HashSet::new();

    for candle in candles {
        let signal_date = candle.day() - Duration::days(1);
        let Some(permission) = permissions.get(signal_date) else {
            continue;
        };
        if !permission.permitted {
            continue;
        }
        eligible.insert(signal_date);
        if consumed.contains(&signal_date) {
            continue;
        }

        let reference_price = match config.reference {
            ReferenceKind::Close => permission.reference_close,
            ReferenceKind::MovingAverage => permission.ma_value,
        };
        if !reference_price.is_finite() {
            continue;
        }
        let target_price = reference_price * (1.0 - config.dip_pct);

        if let Some((entry_price, fill)) = dip_fill(candle, target_price) {
            consumed.insert(signal_date);
            entries.push(Entry {
                signal_date,
                entry_time: candle.timestamp,
                entry_price,
                reference_price,
                target_price,
                fill,
            });
        }
    }

    let eligible_signals = eligible.len();
    let entries_found = entries.len();
    let summary = EntryScanSummary {
        eligible_signals,
        entries_found,
        missed_signals: eligible_signals - entries_found,
        conversion_rate: if eligible_signals == 0 {
            0.0
        } else {
            entries_found as f64 / eligible_signals as f64
        },
    };

    tracing::info!(
        eligible = summary.eligible_signals,
        entries = summary.entries_found,
        missed = summary.missed_signals,
        "entry scan complete"
    );

    Ok(EntryScan { entries, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DailyPermission;
    use chrono::TimeZone;

    fn candle(day: u32, hour: u32, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn permit(day: u32, close: f64, ma: f64) -> DailyPermission {
        DailyPermission {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            permitted: true,
            reference_close: close,
            ma_value: ma,
        }
    }

    #[test]
    fn fill_rules() {
        let target = 98.0;
        assert_eq!(
            dip_fill(&candle(2, 0, 97.0, 97.5, 96.0, 96.5), target),
            Some((97.0, FillKind::Gap))
        );
        // open exactly on the target counts as a gap fill
        assert_eq!(
            dip_fill(&candle(2, 0, 98.0, 99.0, 97.5, 98.5), target),
            Some((98.0, FillKind::Gap))
        );
        assert_eq!(
            dip_fill(&candle(2, 0, 100.0, 100.5, 97.0, 99.0), target),
            Some((98.0, FillKind::Limit))
        );
        assert_eq!(dip_fill(&candle(2, 0, 100.0, 100.5, 99.0, 99.5), target), None);
    }

    #[test]
    fn first_qualifying_hour_only() {
        let candles = vec![
            candle(2, 0, 100.0, 100.5, 99.0, 99.5),
            candle(2, 1, 99.5, 99.6, 97.5, 98.0),
            candle(2, 2, 97.0, 97.5, 96.0, 96.5),
        ];
        let perms = PermissionMap::build(&[permit(1, 100.0, 90.0)]).unwrap();
        let scan = find_entries(&candles, &perms, &EntryConfig::default()).unwrap();

        assert_eq!(scan.entries.len(), 1);
        let entry = &scan.entries[0];
        assert_eq!(entry.entry_time.format("%H").to_string(), "01");
        assert_eq!(entry.entry_price, 98.0);
        assert_eq!(entry.fill, FillKind::Limit);
        assert_eq!(scan.summary.conversion_rate, 1.0);
    }

    #[test]
    fn moving_average_reference() {
        let candles = vec![candle(2, 0, 95.0, 95.5, 94.0, 95.0)];
        let perms = PermissionMap::build(&[permit(1, 100.0, 90.0)]).unwrap();
        let config = EntryConfig {
            dip_pct: 0.02,
            reference: ReferenceKind::MovingAverage,
        };
        let scan = find_entries(&candles, &perms, &config).unwrap();
        // target 88.2 never reached
        assert!(scan.entries.is_empty());
        assert_eq!(scan.summary.eligible_signals, 1);
        assert_eq!(scan.summary.missed_signals, 1);
    }

    #[test]
    fn unpermitted_days_are_ignored() {
        let candles = vec![candle(2, 0, 50.0, 50.5, 49.0, 50.0)];
        let mut row = permit(1, 100.0, 90.0);
        row.permitted = false;
        let perms = PermissionMap::build(&[row]).unwrap();
        let scan = find_entries(&candles, &perms, &EntryConfig::default()).unwrap();
        assert!(scan.entries.is_empty());
        assert_eq!(scan.summary, EntryScanSummary::default());
    }
}
