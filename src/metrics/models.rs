use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Growth,
    Efficiency,
    Profitability,
    Retention,
}

impl FromStr for MetricCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "growth" => Ok(MetricCategory::Growth),
            "efficiency" => Ok(MetricCategory::Efficiency),
            "profitability" => Ok(MetricCategory::Profitability),
            "retention" => Ok(MetricCategory::Retention),
            _ => Err(format!("Invalid metric category: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Percentage,
    Currency,
    Ratio,
    Number,
}

/// Which formula produces a metric's value from its raw input fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFormula {
    RevenueGrowth,
    NetDollarRetention,
    GrossRevenueRetention,
    LogoChurnRate,
    MagicNumber,
    BurnMultiple,
    EbitdaMargin,
    GrossMargin,
    RuleOf40,
    ArrPerEmployee,
}

/// Immutable description of one benchmark metric.
///
/// Definitions are owned by the process-wide registry, loaded once at
/// startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub category: MetricCategory,
    pub unit: MetricUnit,
    pub formula: MetricFormula,
    pub required_fields: Vec<String>,
    /// Inclusive bounds a computed value must fall within.
    pub valid_range: (f64, f64),
}

/// A computed metric value at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValue {
    pub metric_id: String,
    pub value: f64,
    pub computed_at: DateTime<Utc>,
}

/// Percentile values against the benchmark population.
///
/// Ascending by construction; strictly ascending for varied populations,
/// collapsing to a single value only when the population is constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileSet {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

impl PercentileSet {
    pub fn is_ascending(&self) -> bool {
        self.p5 <= self.p25 && self.p25 <= self.p50 && self.p50 <= self.p75 && self.p75 <= self.p90
    }
}

/// Confidence band around one percentile point, used to render bands in the
/// dashboard. Returned alongside a `PercentileSet`, never stored in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceBound {
    pub percentile: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Histogram of the benchmark population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSummary {
    /// Bin edges, always one longer than `frequencies`.
    pub bins: Vec<f64>,
    /// Raw counts, or percentages of the filtered total when normalized.
    pub frequencies: Vec<f64>,
    pub mean: f64,
    pub std_deviation: f64,
    /// Values excluded by IQR filtering; zero when filtering is disabled.
    pub outliers: usize,
}

/// The combined payload served to callers and cached as one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric_id: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub percentiles: PercentileSet,
    pub distribution: DistributionSummary,
    pub computed_at: DateTime<Utc>,
}

impl MetricResult {
    /// The bare value/timestamp projection, for collaborators that do not
    /// need the statistics attached.
    pub fn metric_value(&self) -> MetricValue {
        MetricValue {
            metric_id: self.metric_id.clone(),
            value: self.value,
            computed_at: self.computed_at,
        }
    }
}

/// Raw material fetched from the backing store for one metric: the named
/// input fields for the tenant plus the benchmark population to rank
/// against. This is the only shape the core depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMetricInputs {
    pub fields: HashMap<String, f64>,
    pub benchmark_population: Vec<f64>,
}
