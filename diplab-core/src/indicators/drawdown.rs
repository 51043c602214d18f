//! Causal running peak and drawdown. The peak never resets.

/// Running maximum of `values`. NaN inputs leave the peak unchanged
/// (NaN until the first finite value).
pub fn running_peak(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NAN;
    values
        .iter()
        .map(|&v| {
            if !v.is_nan() && (peak.is_nan() || v > peak) {
                peak = v;
            }
            peak
        })
        .collect()
}

/// `(value - peak) / peak` against the running peak. Always ≤ 0.
pub fn drawdown(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .zip(running_peak(values))
        .map(|(&v, peak)| (v - peak) / peak)
        .collect()
}
