//! Hourly → daily (UTC) aggregation.

use crate::domain::Candle;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hours required for a day to count as complete.
pub const HOURS_PER_DAY: usize = 24;

/// One complete UTC day of OHLCV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A day that was left out of the aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedDay {
    pub date: NaiveDate,
    pub candle_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyAggregation {
    pub days: Vec<DailyBar>,
    pub dropped_days: Vec<DroppedDay>,
}

impl DailyAggregation {
    pub fn closes(&self) -> Vec<f64> {
        self.days.iter().map(|d| d.close).collect()
    }
}

/// Group candles by UTC date: open = first, high = max, low = min,
/// close = last, volume = sum. Days without exactly 24 candles are dropped.
pub fn aggregate_daily(candles: &[Candle]) -> DailyAggregation {
    let mut groups: BTreeMap<NaiveDate, Vec<&Candle>> = BTreeMap::new();
    for candle in candles {
        groups.entry(candle.day()).or_default().push(candle);
    }

    let mut agg = DailyAggregation::default();
    for (date, mut hours) in groups {
        if hours.len() != HOURS_PER_DAY {
            agg.dropped_days.push(DroppedDay {
                date,
                candle_count: hours.len(),
            });
            continue;
        }
        hours.sort_by_key(|c| c.timestamp);

        let open = hours[0].open;
        let close = hours[HOURS_PER_DAY - 1].close;
        let high = hours.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let low = hours.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let volume = hours.iter().map(|c| c.volume).sum();

        agg.days.push(DailyBar {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    if !agg.dropped_days.is_empty() {
        tracing::warn!(
            dropped = agg.dropped_days.len(),
            kept = agg.days.len(),
            "dropped incomplete days during daily aggregation"
        );
    }

    agg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_candles;

    #[test]
    fn aggregates_complete_days() {
        let closes: Vec<f64> = (0..48).map(|i| 100.0 + i as f64).collect();
        let agg = aggregate_daily(&test_candles(&closes));

        assert_eq!(agg.days.len(), 2);
        assert!(agg.dropped_days.is_empty());

        let first = &agg.days[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(first.open, 100.0);
        assert_eq!(first.close, 123.0);
        assert!(first.high >= 123.0);
        assert_eq!(first.volume, 24.0 * 1000.0);
        assert_eq!(agg.closes(), vec![123.0, 147.0]);
    }

    #[test]
    fn drops_incomplete_days() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let agg = aggregate_daily(&test_candles(&closes));

        assert_eq!(agg.days.len(), 1);
        assert_eq!(
            agg.dropped_days,
            vec![DroppedDay {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                candle_count: 6,
            }]
        );
    }
}
