//! Relative Strength Index (RSI) over day-over-day deltas.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! First valid value at index `period` (needs `period` deltas).
//! avg_loss == 0 → NaN; the ratio is undefined rather than infinite.

use serde::{Deserialize, Serialize};

/// How average gain and loss are smoothed after the seed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiSmoothing {
    /// Seeded with a simple mean, then avg = (avg * (period - 1) + x) / period.
    #[default]
    Wilder,
    /// Plain rolling mean of the last `period` gains and losses.
    Simple,
}

pub fn rsi(values: &[f64], period: usize, smoothing: RsiSmoothing) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period + 1 {
        return result;
    }

    let mut gains = vec![f64::NAN; n];
    let mut losses = vec![f64::NAN; n];
    for i in 1..n {
        let delta = values[i] - values[i - 1];
        if !delta.is_nan() {
            gains[i] = delta.max(0.0);
            losses[i] = (-delta).max(0.0);
        }
    }

    match smoothing {
        RsiSmoothing::Simple => {
            for i in period..n {
                let window = (i + 1 - period)..=i;
                let g = &gains[window.clone()];
                let l = &losses[window];
                if g.iter().chain(l).any(|v| v.is_nan()) {
                    continue;
                }
                let avg_gain = g.iter().sum::<f64>() / period as f64;
                let avg_loss = l.iter().sum::<f64>() / period as f64;
                result[i] = rsi_value(avg_gain, avg_loss);
            }
        }
        RsiSmoothing::Wilder => {
            let seed_g = &gains[1..=period];
            let seed_l = &losses[1..=period];
            if seed_g.iter().chain(seed_l).any(|v| v.is_nan()) {
                return result;
            }
            let mut avg_gain = seed_g.iter().sum::<f64>() / period as f64;
            let mut avg_loss = seed_l.iter().sum::<f64>() / period as f64;
            result[period] = rsi_value(avg_gain, avg_loss);

            let alpha = 1.0 / period as f64;
            for i in (period + 1)..n {
                if gains[i].is_nan() {
                    return result;
                }
                avg_gain = alpha * gains[i] + (1.0 - alpha) * avg_gain;
                avg_loss = alpha * losses[i] + (1.0 - alpha) * avg_loss;
                result[i] = rsi_value(avg_gain, avg_loss);
            }
        }
    }

    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return f64::NAN;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rsi_first_valid_index() {
        let values = [44.0, 44.34, 44.09, 43.61, 44.33];
        for smoothing in [RsiSmoothing::Wilder, RsiSmoothing::Simple] {
            let result = rsi(&values, 3, smoothing);
            assert!(result[..3].iter().all(|v| v.is_nan()));
            // gains 0.34, losses 0.73 over the first three deltas
            assert_approx(result[3], 100.0 - 100.0 / (1.0 + 0.34 / 0.73), 1e-9);
        }
    }

    #[test]
    fn rsi_smoothing_diverges_after_seed() {
        // deltas: +0.34, -0.25, -0.48, +0.72
        let values = [44.0, 44.34, 44.09, 43.61, 44.33];
        let wilder = rsi(&values, 3, RsiSmoothing::Wilder);
        let simple = rsi(&values, 3, RsiSmoothing::Simple);

        let w_gain = (0.34 / 3.0) * (2.0 / 3.0) + 0.72 / 3.0;
        let w_loss = (0.73 / 3.0) * (2.0 / 3.0);
        assert_approx(wilder[4], 100.0 - 100.0 / (1.0 + w_gain / w_loss), 1e-9);

        let s_gain = 0.72 / 3.0;
        let s_loss = 0.73 / 3.0;
        assert_approx(simple[4], 100.0 - 100.0 / (1.0 + s_gain / s_loss), 1e-9);
    }

    #[test]
    fn rsi_all_gains_is_nan() {
        let result = rsi(&[100.0, 101.0, 102.0, 103.0, 104.0], 3, RsiSmoothing::Wilder);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let result = rsi(&[105.0, 104.0, 103.0, 102.0], 3, RsiSmoothing::Simple);
        assert_approx(result[3], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_bounds() {
        let values = [100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0];
        for (i, &v) in rsi(&values, 3, RsiSmoothing::Wilder).iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "RSI out of bounds at {i}: {v}");
            }
        }
    }
}
