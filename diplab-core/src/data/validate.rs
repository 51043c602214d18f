//! Input integrity checks for the hourly candle sequence.
//!
//! The simulator assumes a strictly ascending, gap-free, hour-aligned series.
//! These checks fail on the first offending record; nothing is dropped or
//! interpolated here. See [`super::repair_gaps`] for the explicit repair step.

use crate::domain::Candle;
use chrono::{DateTime, Duration, Timelike, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CandleError {
    #[error("candle {index} at {timestamp}: non-finite OHLCV field")]
    NonFinite {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("candle {index} at {timestamp}: inconsistent OHLC (high={high}, low={low}, open={open}, close={close})")]
    InsaneOhlc {
        index: usize,
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("candle {index} at {timestamp}: not aligned to an hour boundary")]
    Misaligned {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("candle {index} at {timestamp}: duplicate timestamp")]
    Duplicate {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("candle {index} at {timestamp}: out of order (previous {previous})")]
    Unsorted {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
    },

    #[error("candle {index} at {timestamp}: gap of {missing_hours} missing hour(s) after {previous}")]
    Gap {
        index: usize,
        timestamp: DateTime<Utc>,
        previous: DateTime<Utc>,
        missing_hours: i64,
    },
}

impl CandleError {
    /// Index of the first offending record.
    pub fn index(&self) -> usize {
        match self {
            CandleError::NonFinite { index, .. }
            | CandleError::InsaneOhlc { index, .. }
            | CandleError::Misaligned { index, .. }
            | CandleError::Duplicate { index, .. }
            | CandleError::Unsorted { index, .. }
            | CandleError::Gap { index, .. } => *index,
        }
    }
}

/// Check a candle sequence: finite and sane OHLCV, hour-aligned, strictly
/// ascending with exactly one hour between neighbours.
pub fn validate_candles(candles: &[Candle]) -> Result<(), CandleError> {
    let mut previous: Option<DateTime<Utc>> = None;

    for (index, candle) in candles.iter().enumerate() {
        let timestamp = candle.timestamp;

        if !candle.is_finite() {
            return Err(CandleError::NonFinite { index, timestamp });
        }
        if !candle.is_sane() {
            return Err(CandleError::InsaneOhlc {
                index,
                timestamp,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
            });
        }
        if timestamp.minute() != 0 || timestamp.second() != 0 || timestamp.nanosecond() != 0 {
            return Err(CandleError::Misaligned { index, timestamp });
        }

        if let Some(prev) = previous {
            let step = timestamp - prev;
            if step == Duration::zero() {
                return Err(CandleError::Duplicate { index, timestamp });
            }
            if step < Duration::zero() {
                return Err(CandleError::Unsorted {
                    index,
                    timestamp,
                    previous: prev,
                });
            }
            if step > Duration::hours(1) {
                return Err(CandleError::Gap {
                    index,
                    timestamp,
                    previous: prev,
                    missing_hours: step.num_hours() - 1,
                });
            }
        }
        previous = Some(timestamp);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_candles;
    use chrono::TimeZone;

    #[test]
    fn clean_series_passes() {
        let candles = test_candles(&[100.0, 101.0, 99.5, 102.0]);
        assert_eq!(validate_candles(&candles), Ok(()));
        assert_eq!(validate_candles(&[]), Ok(()));
    }

    #[test]
    fn detects_gap_with_first_offender() {
        let mut candles = test_candles(&[100.0, 101.0, 102.0, 103.0]);
        candles.remove(2);
        let err = validate_candles(&candles).unwrap_err();
        assert_eq!(err.index(), 2);
        assert!(matches!(err, CandleError::Gap { missing_hours: 1, .. }));
    }

    #[test]
    fn detects_duplicate_and_unsorted() {
        let mut candles = test_candles(&[100.0, 101.0, 102.0]);
        candles[2].timestamp = candles[1].timestamp;
        assert!(matches!(
            validate_candles(&candles),
            Err(CandleError::Duplicate { index: 2, .. })
        ));

        let mut candles = test_candles(&[100.0, 101.0, 102.0]);
        candles[2].timestamp = candles[1].timestamp - Duration::hours(2);
        assert!(matches!(
            validate_candles(&candles),
            Err(CandleError::Unsorted { index: 2, .. })
        ));
    }

    #[test]
    fn swapped_neighbours_surface_as_gap_first() {
        let mut candles = test_candles(&[100.0, 101.0, 102.0]);
        candles.swap(1, 2);
        assert!(matches!(
            validate_candles(&candles),
            Err(CandleError::Gap { index: 1, missing_hours: 1, .. })
        ));
    }

    #[test]
    fn detects_bad_values() {
        let mut candles = test_candles(&[100.0, 101.0]);
        candles[1].close = f64::NAN;
        assert!(matches!(
            validate_candles(&candles),
            Err(CandleError::NonFinite { index: 1, .. })
        ));

        let mut candles = test_candles(&[100.0, 101.0]);
        candles[0].high = candles[0].low - 1.0;
        assert!(matches!(
            validate_candles(&candles),
            Err(CandleError::InsaneOhlc { index: 0, .. })
        ));
    }

    #[test]
    fn detects_misaligned_timestamp() {
        let mut candles = test_candles(&[100.0]);
        candles[0].timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 30, 0).unwrap();
        assert!(matches!(
            validate_candles(&candles),
            Err(CandleError::Misaligned { index: 0, .. })
        ));
    }
}
