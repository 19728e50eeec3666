//! Summary statistics over synthesized packet timestamps.

use crate::DelayStats;

/// Summarise the gaps between consecutive timestamps.
///
/// Timestamps are expected in emission order. Returns empty stats when fewer
/// than two timestamps are given.
pub fn delay_stats(timestamps: &[f64]) -> DelayStats {
    let gaps: Vec<f64> = timestamps.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return DelayStats::empty();
    }

    let m = mean(&gaps);
    let mut sorted = gaps.clone();
    sorted.sort_by(f64::total_cmp);

    DelayStats {
        mean: m,
        std: std_dev(&gaps, m),
        p50: percentile(&sorted, 0.50),
        p90: percentile(&sorted, 0.90),
    }
}

/// Calculate the mean of a slice of values.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculate the population standard deviation of a slice of values.
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile of ascending-sorted values, linearly interpolated between ranks.
///
/// `p` is a fraction in `0.0..=1.0`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = p.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] * (1.0 - frac) + sorted[upper] * frac
        }
    }
}
