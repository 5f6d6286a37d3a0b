use thiserror::Error;

/// Errors surfaced by the metrics pipeline.
///
/// Variants carry enough structured context (metric id, offending fields,
/// attempted value) for callers to render a precise message without
/// re-deriving it. The enum is `Clone` because results are fanned out to
/// every waiter coalesced behind a single in-flight computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("missing or non-numeric input fields for {metric_id}: {fields:?}")]
    MissingFields {
        metric_id: String,
        fields: Vec<String>,
    },

    #[error("computed value {value} for {metric_id} outside valid range [{min}, {max}]")]
    ValueOutOfRange {
        metric_id: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("insufficient benchmark data: {actual} points, at least {required} required")]
    InsufficientData { required: usize, actual: usize },

    #[error("calculation failed for {metric_id}: {reason}")]
    Calculation { metric_id: String, reason: String },

    #[error("metric not found: {metric_id}")]
    NotFound { metric_id: String },

    #[error("circuit breaker is open, backing store calls suspended")]
    CircuitOpen,

    #[error("backing store unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("database error: {message}")]
    Database { message: String },

    #[error("backing store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl MetricsError {
    /// Whether a retry could plausibly change the outcome.
    ///
    /// Validation and calculation failures are deterministic given their
    /// inputs; only I/O-shaped failures against the backing store qualify.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetricsError::Database { .. } | MetricsError::Timeout { .. }
        )
    }
}

impl From<sqlx::Error> for MetricsError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => MetricsError::NotFound {
                metric_id: String::new(),
            },
            other => MetricsError::Database {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        MetricsError::Serialization {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
