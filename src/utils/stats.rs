//! Small descriptive-statistics helpers shared by the reporter and the
//! diagnostics.

/// Sample mean. Zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Sample median.
pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Central credible interval bounds.
pub fn central_interval(values: &[f64], prob: f64) -> (f64, f64) {
    let tail = (1.0 - prob) / 2.0;
    (quantile(values, tail), quantile(values, 1.0 - tail))
}
