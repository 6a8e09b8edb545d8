//! Statistics Calculator Module
//! Descriptive statistics, correlation and density estimates over plain slices.

use statrs::distribution::{Continuous, Normal};
use statrs::statistics::Statistics;

/// Descriptive statistics for a set of amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct AmountStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; NaN for fewer than two values.
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub q75: f64,
    pub max: f64,
}

impl Default for AmountStats {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
            min: f64::NAN,
            q25: f64::NAN,
            q75: f64::NAN,
            max: f64::NAN,
        }
    }
}

/// Five-number summary used to draw a box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

/// Handles statistical calculations.
pub struct StatsCalculator;

impl StatsCalculator {
    /// Compute descriptive statistics, ignoring NaN values.
    pub fn compute_descriptive_stats(values: &[f64]) -> AmountStats {
        let sorted = Self::sorted(values);
        let n = sorted.len();
        if n == 0 {
            return AmountStats::default();
        }

        let sum: f64 = sorted.iter().sum();
        let mean = sum / n as f64;
        let std = if n > 1 {
            sorted.iter().std_dev()
        } else {
            f64::NAN
        };

        AmountStats {
            count: n,
            sum,
            mean,
            median: Self::percentile(&sorted, 50.0),
            std,
            min: sorted[0],
            q25: Self::percentile(&sorted, 25.0),
            q75: Self::percentile(&sorted, 75.0),
            max: sorted[n - 1],
        }
    }

    /// Calculate percentile using linear interpolation (NumPy compatible).
    pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    /// Pearson correlation of two equally long samples.
    ///
    /// NaN when either sample has zero variance or fewer than two points.
    pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
        if x.len() != y.len() || x.len() < 2 {
            return f64::NAN;
        }
        let mean_x = x.mean();
        let mean_y = y.mean();
        let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
        for (a, b) in x.iter().zip(y) {
            let dx = a - mean_x;
            let dy = b - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        if var_x == 0.0 || var_y == 0.0 {
            return f64::NAN;
        }
        (cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
    }

    /// Gaussian kernel density evaluated at `points`, Scott's rule bandwidth.
    pub fn kde(values: &[f64], points: &[f64]) -> Vec<f64> {
        let sorted = Self::sorted(values);
        let n = sorted.len();
        let std = if n > 1 { sorted.iter().std_dev() } else { 0.0 };
        let bandwidth = std * (n as f64).powf(-0.2);
        let Ok(kernel) = Normal::new(0.0, 1.0) else {
            return vec![0.0; points.len()];
        };
        if n == 0 || bandwidth <= 0.0 || !bandwidth.is_finite() {
            return vec![0.0; points.len()];
        }

        points
            .iter()
            .map(|&x| {
                sorted
                    .iter()
                    .map(|&v| kernel.pdf((x - v) / bandwidth))
                    .sum::<f64>()
                    / (n as f64 * bandwidth)
            })
            .collect()
    }

    /// Quartiles, 1.5 IQR whiskers and outliers.
    pub fn box_stats(values: &[f64]) -> Option<BoxStats> {
        let sorted = Self::sorted(values);
        if sorted.is_empty() {
            return None;
        }
        let q1 = Self::percentile(&sorted, 25.0);
        let median = Self::percentile(&sorted, 50.0);
        let q3 = Self::percentile(&sorted, 75.0);
        let iqr = q3 - q1;
        let (lo_fence, hi_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let whisker_low = sorted.iter().copied().find(|&v| v >= lo_fence).unwrap_or(q1);
        let whisker_high = sorted.iter().rev().copied().find(|&v| v <= hi_fence).unwrap_or(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|&v| v < lo_fence || v > hi_fence)
            .collect();

        Some(BoxStats {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
        })
    }

    fn sorted(values: &[f64]) -> Vec<f64> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_descriptive_stats() {
        let stats = StatsCalculator::compute_descriptive_stats(&[100.5, 250.75, 75.25, 125.0, 300.0, 50.0]);
        assert_eq!(stats.count, 6);
        assert!(approx(stats.mean, 150.25));
        assert!(approx(stats.sum, 901.5));
        assert!(approx(stats.min, 50.0));
        assert!(approx(stats.max, 300.0));
        assert!(approx(stats.median, 112.75));
        // numpy: percentile([50, 75.25, 100.5, 125, 250.75, 300], 25) == 81.5625
        assert!(approx(stats.q25, 81.5625));
    }

    #[test]
    fn test_single_value_has_nan_std() {
        let stats = StatsCalculator::compute_descriptive_stats(&[4.0]);
        assert_eq!(stats.count, 1);
        assert!(stats.std.is_nan());
        assert!(approx(stats.median, 4.0));
    }

    #[test]
    fn test_empty_and_nan_values() {
        let stats = StatsCalculator::compute_descriptive_stats(&[f64::NAN]);
        assert_eq!(stats.count, 0);
        assert!(stats.mean.is_nan());
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(StatsCalculator::percentile(&sorted, 50.0), 2.5));
        assert!(approx(StatsCalculator::percentile(&sorted, 100.0), 4.0));
        assert!(StatsCalculator::percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_pearson() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(StatsCalculator::pearson(&x, &[2.0, 4.0, 6.0, 8.0]), 1.0));
        assert!(approx(StatsCalculator::pearson(&x, &[8.0, 6.0, 4.0, 2.0]), -1.0));
        assert!(StatsCalculator::pearson(&x, &[1.0, 1.0, 1.0, 1.0]).is_nan());
    }

    #[test]
    fn test_kde_integrates_to_one() {
        let values = [1.0, 2.0, 2.5, 3.0, 7.0];
        let step = 0.01;
        let grid: Vec<f64> = (0..2000).map(|i| -5.0 + i as f64 * step).collect();
        let area: f64 = StatsCalculator::kde(&values, &grid).iter().sum::<f64>() * step;
        assert!((area - 1.0).abs() < 1e-3);
        assert_eq!(StatsCalculator::kde(&[3.0], &grid[..3]), vec![0.0; 3]);
    }

    #[test]
    fn test_box_stats_outliers() {
        let stats = StatsCalculator::box_stats(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert!(approx(stats.median, 3.0));
        assert_eq!(stats.outliers, vec![100.0]);
        assert!(approx(stats.whisker_high, 4.0));
        assert!(approx(stats.whisker_low, 1.0));
        assert!(StatsCalculator::box_stats(&[]).is_none());
    }
}
