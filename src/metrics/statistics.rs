//! Percentile and significance statistics over benchmark populations.
//!
//! Percentiles use the linear-interpolation-between-closest-ranks method:
//! for percentile `p` over a sorted population of `n` values, the fractional
//! index is `(p/100) * (n - 1)` and the estimate interpolates between the
//! two nearest ranks. The method is deterministic and continuous — the
//! estimate does not jump as the population grows by one value.

use super::error::{MetricsError, Result};
use super::models::{ConfidenceBound, PercentileSet};

/// Minimum population size for any statistic to be meaningful.
pub const MIN_DATA_POINTS: usize = 5;

/// Percentile points served to the dashboard.
pub const DEFAULT_PERCENTILE_POINTS: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 90.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    Ninety5,
    Ninety9,
}

impl ConfidenceLevel {
    /// Two-sided z critical value.
    pub fn z(&self) -> f64 {
        match self {
            ConfidenceLevel::Ninety5 => 1.96,
            ConfidenceLevel::Ninety9 => 2.576,
        }
    }
}

pub struct PercentileStatistics;

impl PercentileStatistics {
    /// Standard percentile set at [5, 25, 50, 75, 90].
    pub fn percentiles(population: &[f64]) -> Result<PercentileSet> {
        let values = Self::percentiles_at(population, &DEFAULT_PERCENTILE_POINTS)?;
        Ok(PercentileSet {
            p5: values[0],
            p25: values[1],
            p50: values[2],
            p75: values[3],
            p90: values[4],
        })
    }

    /// Percentile values at arbitrary points.
    pub fn percentiles_at(population: &[f64], points: &[f64]) -> Result<Vec<f64>> {
        let sorted = Self::sorted_copy(population)?;
        points
            .iter()
            .map(|p| {
                if !(0.0..=100.0).contains(p) {
                    return Err(MetricsError::Calculation {
                        metric_id: String::new(),
                        reason: format!("percentile point {p} outside [0, 100]"),
                    });
                }
                Ok(interpolate_at_fraction(&sorted, p / 100.0))
            })
            .collect()
    }

    /// Confidence bounds per percentile point at the given level.
    ///
    /// The standard error of the percentile fraction is `sqrt(p(1-p)/n)`;
    /// the shifted fractions are clamped to [0, 1] and mapped back to
    /// values with the same interpolation used for the point estimates.
    pub fn confidence_bounds(
        population: &[f64],
        points: &[f64],
        level: ConfidenceLevel,
    ) -> Result<Vec<ConfidenceBound>> {
        let sorted = Self::sorted_copy(population)?;
        let n = sorted.len() as f64;
        let z = level.z();

        points
            .iter()
            .map(|&p| {
                let fraction = p / 100.0;
                let std_error = (fraction * (1.0 - fraction) / n).sqrt();
                let lower_fraction = (fraction - z * std_error).clamp(0.0, 1.0);
                let upper_fraction = (fraction + z * std_error).clamp(0.0, 1.0);
                Ok(ConfidenceBound {
                    percentile: p,
                    lower: interpolate_at_fraction(&sorted, lower_fraction),
                    upper: interpolate_at_fraction(&sorted, upper_fraction),
                })
            })
            .collect()
    }

    /// Two-sided significance of a value against the population, in [0, 1].
    ///
    /// Uses the z-score of the value under a normal approximation of the
    /// population. A constant population carries no evidence either way.
    pub fn trend_significance(value: f64, population: &[f64]) -> Result<f64> {
        let sorted = Self::sorted_copy(population)?;
        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return Ok(0.0);
        }

        let z = (value - mean) / std_dev;
        Ok((2.0 * normal_cdf(z.abs()) - 1.0).clamp(0.0, 1.0))
    }

    fn sorted_copy(population: &[f64]) -> Result<Vec<f64>> {
        if population.len() < MIN_DATA_POINTS {
            return Err(MetricsError::InsufficientData {
                required: MIN_DATA_POINTS,
                actual: population.len(),
            });
        }
        let mut sorted = population.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(sorted)
    }
}

/// Value at fraction `f` of the sorted population, `f` in [0, 1], by linear
/// interpolation between the two nearest ranks.
fn interpolate_at_fraction(sorted: &[f64], fraction: f64) -> f64 {
    let n = sorted.len();
    let index = fraction * (n - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = index - lower as f64;
    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 polynomial erf
/// approximation (absolute error below 1.5e-7).
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}
