//! Explicit gap repair. Never invoked by the simulator itself.

use crate::domain::Candle;
use chrono::Duration;

/// Fill every missing hour with a flat candle at the previous close and zero
/// volume. Input must already be ascending; duplicates and out-of-order rows
/// are passed through untouched for [`super::validate_candles`] to reject.
///
/// Returns the repaired series and the number of inserted candles.
pub fn repair_gaps(candles: &[Candle]) -> (Vec<Candle>, usize) {
    let mut out = Vec::with_capacity(candles.len());
    let mut inserted = 0usize;

    for candle in candles {
        if let Some((prev_ts, prev_close)) = out.last().map(|c: &Candle| (c.timestamp, c.close)) {
            let mut next_ts = prev_ts + Duration::hours(1);
            while next_ts < candle.timestamp {
                out.push(Candle {
                    timestamp: next_ts,
                    open: prev_close,
                    high: prev_close,
                    low: prev_close,
                    close: prev_close,
                    volume: 0.0,
                });
                inserted += 1;
                next_ts += Duration::hours(1);
            }
        }
        out.push(candle.clone());
    }

    (out, inserted)
}
