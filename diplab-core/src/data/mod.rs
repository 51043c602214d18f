//! Candle integrity, gap repair and daily aggregation.

pub mod daily;
pub mod repair;
pub mod validate;

pub use daily::{aggregate_daily, DailyAggregation, DailyBar, DroppedDay, HOURS_PER_DAY};
pub use repair::repair_gaps;
pub use validate::{validate_candles, CandleError};

/// Hourly candles from close prices, starting 2024-01-01 00:00 UTC.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 0.5, low = min(open, close) - 0.5, volume = 1000.
#[cfg(test)]
pub fn test_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            crate::domain::Candle {
                timestamp: start + Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}
