//! # Chain Diagnostics
//!
//! Effective sample size via Geyer's initial-positive-sequence estimator and
//! split-R-hat across chains. These feed the fit adequacy report; degenerate
//! chains are rejected upstream, while marginal mixing is surfaced as a
//! warning rather than a failure.

/// Effective sample size of one draw sequence.
///
/// Sums autocovariance in lag pairs and truncates at the first non-positive
/// pair (Geyer's initial positive sequence), matching the Tracer convention.
pub fn ess(input: &[f64]) -> f64 {
    let samples = input.len();
    if samples < 2 {
        return samples as f64;
    }
    let max_lag_limit = 2000usize;
    let max_lag = std::cmp::min(samples - 1, max_lag_limit);
    let mean = input.iter().sum::<f64>() / samples as f64;
    let mut gamma_stat = vec![0.0; max_lag];
    let mut var_stat = 0.0;
    for lag in 0..max_lag {
        let mut acc = 0.0;
        for j in 0..(samples - lag) {
            acc += (input[j] - mean) * (input[j + lag] - mean);
        }
        gamma_stat[lag] = acc / (samples - lag) as f64;
        if lag == 0 {
            var_stat = gamma_stat[0];
        } else if lag % 2 == 0 {
            let pair_sum = gamma_stat[lag - 1] + gamma_stat[lag];
            if pair_sum > 0.0 {
                var_stat += 2.0 * pair_sum;
            } else {
                break;
            }
        }
    }
    if gamma_stat[0] <= 0.0 {
        // Constant sequence has no information.
        return 0.0;
    }
    let act = var_stat / gamma_stat[0];
    samples as f64 / act
}

/// Split-R-hat over several chains' draws of one parameter.
///
/// Each chain is split in half; R-hat compares between-half to within-half
/// variance. Values near 1 indicate the chains sample the same distribution.
/// Returns NaN when there is not enough data to form two halves.
pub fn split_rhat(chains: &[&[f64]]) -> f64 {
    let mut halves: Vec<&[f64]> = Vec::with_capacity(chains.len() * 2);
    let min_len = chains.iter().map(|c| c.len()).min().unwrap_or(0);
    let half = min_len / 2;
    if half < 2 {
        return f64::NAN;
    }
    for chain in chains {
        halves.push(&chain[..half]);
        halves.push(&chain[chain.len() - half..]);
    }

    let m = halves.len() as f64;
    let n = half as f64;
    let means: Vec<f64> = halves
        .iter()
        .map(|h| h.iter().sum::<f64>() / n)
        .collect();
    let grand = means.iter().sum::<f64>() / m;
    let b = n / (m - 1.0) * means.iter().map(|x| (x - grand).powi(2)).sum::<f64>();
    let w = halves
        .iter()
        .zip(&means)
        .map(|(h, mu)| h.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (n - 1.0))
        .sum::<f64>()
        / m;
    if w <= 0.0 {
        return f64::NAN;
    }
    let var_plus = (n - 1.0) / n * w + b / n;
    (var_plus / w).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn iid_draws_have_near_full_ess() {
        let mut rng = SmallRng::seed_from_u64(11);
        let draws: Vec<f64> = (0..2000).map(|_| rng.gen::<f64>() - 0.5).collect();
        let e = ess(&draws);
        assert!(e > 1000.0, "ess = {}", e);
    }

    #[test]
    fn autocorrelated_draws_have_reduced_ess() {
        let mut rng = SmallRng::seed_from_u64(12);
        let mut draws = vec![0.0f64; 2000];
        for i in 1..draws.len() {
            draws[i] = 0.95 * draws[i - 1] + 0.05 * (rng.gen::<f64>() - 0.5);
        }
        assert!(ess(&draws) < 500.0);
    }

    #[test]
    fn constant_sequence_has_zero_ess() {
        assert_eq!(ess(&[1.0; 100]), 0.0);
    }

    #[test]
    fn matching_chains_rhat_near_one() {
        let mut rng = SmallRng::seed_from_u64(13);
        let a: Vec<f64> = (0..1000).map(|_| rng.gen::<f64>()).collect();
        let b: Vec<f64> = (0..1000).map(|_| rng.gen::<f64>()).collect();
        let r = split_rhat(&[&a, &b]);
        assert!((r - 1.0).abs() < 0.05, "rhat = {}", r);
    }

    #[test]
    fn shifted_chains_rhat_large() {
        let a = vec![0.0f64; 100]
            .iter()
            .enumerate()
            .map(|(i, _)| (i % 7) as f64 * 0.01)
            .collect::<Vec<_>>();
        let b: Vec<f64> = a.iter().map(|v| v + 10.0).collect();
        let r = split_rhat(&[&a, &b]);
        assert!(r > 2.0, "rhat = {}", r);
    }
}
