//! Batch-adaptive statistics.
//!
//! Gate thresholds are derived from each cutoff batch's own distribution
//! rather than fixed constants, so the gate tightens or loosens with the
//! day's overall signal strength.

use statrs::statistics::Statistics;

/// Mean; 0.0 for an empty slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    Statistics::mean(data)
}

/// Sample standard deviation; 0.0 with fewer than two points.
pub fn std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    Statistics::std_dev(data)
}

/// Quantile with linear interpolation between order statistics.
///
/// q is clamped to [0, 1]. A single observation is every quantile of itself;
/// an empty slice yields 0.0.
pub fn quantile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Median of a slice; 0.0 for an empty slice.
pub fn median(data: &[f64]) -> f64 {
    quantile(data, 0.5)
}

/// Z-score of `value` against `data`. None when the distribution has no
/// usable variance, so a degenerate profile can never gate a candidate.
pub fn z_score(value: f64, data: &[f64]) -> Option<f64> {
    let sd = std_dev(data);
    if sd < 1e-12 {
        return None;
    }
    Some((value - mean(data)) / sd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&data, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&data, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile(&data, 1.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantile_single_value() {
        assert_eq!(quantile(&[7.0], 0.8), 7.0);
    }

    #[test]
    fn test_quantile_empty() {
        assert_eq!(quantile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_median_unsorted_input() {
        assert!((median(&[9.0, 1.0, 5.0]) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_z_score_flat_profile_is_none() {
        let flat = [3.0, 3.0, 3.0, 3.0];
        assert!(z_score(10.0, &flat).is_none());
    }

    #[test]
    fn test_z_score_centered() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let z = z_score(3.0, &data).unwrap();
        assert!(z.abs() < 1e-12);
    }
}
