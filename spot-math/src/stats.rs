//! Statistical functions for per-frame and per-night reductions

/// Scale factor turning an interquartile range into a Gaussian-equivalent sigma
pub const SIGMA_G_FACTOR: f64 = 0.7413;

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of a slice, ignoring NaN values.
///
/// For even-length data, returns the average of the two middle values.
/// Returns `None` if no valid values remain after filtering NaN.
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile `q` (0..=100) with linear interpolation between closest ranks,
/// ignoring NaN values.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut valid: Vec<f64> = values.iter().filter(|v| !v.is_nan()).copied().collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (valid.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;

    Some(valid[lower] + (valid[upper] - valid[lower]) * fraction)
}

/// Robust Gaussian-equivalent standard deviation from the interquartile range.
pub fn sigma_g(values: &[f64]) -> Option<f64> {
    let q25 = percentile(values, 25.0)?;
    let q75 = percentile(values, 75.0)?;
    Some(SIGMA_G_FACTOR * (q75 - q25))
}

/// Round to a fixed number of decimal places, folding `-0.0` into `0.0` so
/// formatted output never carries a spurious sign.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
