//! Daily-series indicators used by the signal stage.
//!
//! Each function maps an input series to an output of the same length,
//! NaN-padded for the warmup. All are causal: value `i` depends only on
//! inputs `0..=i`.

pub mod drawdown;
pub mod ema;
pub mod rsi;
pub mod sma;

pub use drawdown::{drawdown, running_peak};
pub use ema::ema;
pub use rsi::{rsi, RsiSmoothing};
pub use sma::sma;

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
