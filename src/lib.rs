pub mod config;
pub mod metrics;

pub use config::Config;

// Re-export metrics types for convenience
pub use metrics::{
    error::MetricsError, BenchmarkStore, CacheStore, CircuitBreaker, CircuitBreakerConfig,
    DistributionBinner, FormulaEngine, HistogramOptions, MetricDefinition, MetricRegistry,
    MetricResult, MetricsService, PostgresBenchmarkStore, ResilientFetcher, RetryConfig,
};
