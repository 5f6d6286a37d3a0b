//! Histogram bucketing of benchmark populations.

use super::error::Result;
use super::models::DistributionSummary;
use super::statistics::PercentileStatistics;
use tracing::debug;

/// Multiplier on the interquartile range for outlier fences.
const IQR_FENCE_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct HistogramOptions {
    pub bin_count: usize,
    /// Convert counts to percentages of the filtered total.
    pub normalize: bool,
    /// Drop values outside [Q1 - 1.5*IQR, Q3 + 1.5*IQR] before binning.
    pub exclude_outliers: bool,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            bin_count: 10,
            normalize: true,
            exclude_outliers: false,
        }
    }
}

pub struct DistributionBinner;

impl DistributionBinner {
    pub fn histogram(population: &[f64], opts: HistogramOptions) -> Result<DistributionSummary> {
        // Q1/Q3 on the raw population also enforces the minimum size.
        let quartiles = PercentileStatistics::percentiles_at(population, &[25.0, 75.0])?;

        let (filtered, outliers) = if opts.exclude_outliers {
            let (q1, q3) = (quartiles[0], quartiles[1]);
            let iqr = q3 - q1;
            let lower_fence = q1 - IQR_FENCE_MULTIPLIER * iqr;
            let upper_fence = q3 + IQR_FENCE_MULTIPLIER * iqr;
            let kept: Vec<f64> = population
                .iter()
                .copied()
                .filter(|v| (lower_fence..=upper_fence).contains(v))
                .collect();
            let dropped = population.len() - kept.len();
            if dropped > 0 {
                debug!(
                    outliers = dropped,
                    lower_fence, upper_fence, "excluded outliers before binning"
                );
            }
            (kept, dropped)
        } else {
            (population.to_vec(), 0)
        };

        let min = filtered.iter().copied().fold(f64::INFINITY, f64::min);
        let max = filtered.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let bin_width = (max - min) / opts.bin_count as f64;

        let bins: Vec<f64> = (0..=opts.bin_count)
            .map(|i| min + i as f64 * bin_width)
            .collect();

        let mut counts = vec![0usize; opts.bin_count];
        for &value in &filtered {
            // The maximum value lands on the last edge; clamp it into the
            // final bin instead of overflowing past it.
            let index = if bin_width > 0.0 {
                (((value - min) / bin_width) as usize).min(opts.bin_count - 1)
            } else {
                0
            };
            counts[index] += 1;
        }

        let total = filtered.len() as f64;
        let frequencies: Vec<f64> = if opts.normalize {
            counts.iter().map(|&c| c as f64 / total * 100.0).collect()
        } else {
            counts.iter().map(|&c| c as f64).collect()
        };

        let mean = filtered.iter().sum::<f64>() / total;
        let variance = filtered.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / total;

        Ok(DistributionSummary {
            bins,
            frequencies,
            mean,
            std_deviation: variance.sqrt(),
            outliers,
        })
    }
}
