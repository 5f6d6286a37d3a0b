//! Narrow read interface to the backing store.
//!
//! The core depends only on `BenchmarkStore`: raw input fields plus the
//! benchmark population for a metric, and the metric ids derived from a
//! data source (for admin-triggered invalidation). The storage engine,
//! schema, and query layer behind it are collaborators, not concerns.

use super::error::{MetricsError, Result};
use super::models::RawMetricInputs;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    /// Raw input fields and benchmark population for one metric.
    async fn fetch_raw_inputs(&self, metric_id: &str) -> Result<RawMetricInputs>;

    /// Metric ids derived from a data source, for cache invalidation when
    /// the source changes.
    async fn metric_ids_for_source(&self, source_id: &str) -> Result<Vec<String>>;
}

pub struct PostgresBenchmarkStore {
    pool: PgPool,
}

impl PostgresBenchmarkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn check_health(&self) -> Result<bool> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

#[async_trait]
impl BenchmarkStore for PostgresBenchmarkStore {
    async fn fetch_raw_inputs(&self, metric_id: &str) -> Result<RawMetricInputs> {
        let field_rows =
            sqlx::query("SELECT field_name, field_value FROM metric_inputs WHERE metric_id = $1")
                .bind(metric_id)
                .fetch_all(&self.pool)
                .await?;

        if field_rows.is_empty() {
            return Err(MetricsError::NotFound {
                metric_id: metric_id.to_string(),
            });
        }

        let mut fields = HashMap::with_capacity(field_rows.len());
        for row in field_rows {
            let name: String = row.try_get("field_name")?;
            let value: f64 = row.try_get("field_value")?;
            fields.insert(name, value);
        }

        let population_rows = sqlx::query(
            "SELECT value FROM benchmark_values WHERE metric_id = $1 ORDER BY value",
        )
        .bind(metric_id)
        .fetch_all(&self.pool)
        .await?;

        let benchmark_population = population_rows
            .into_iter()
            .map(|row| row.try_get::<f64, _>("value"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            metric_id,
            fields = fields.len(),
            population = benchmark_population.len(),
            "fetched raw inputs"
        );

        Ok(RawMetricInputs {
            fields,
            benchmark_population,
        })
    }

    async fn metric_ids_for_source(&self, source_id: &str) -> Result<Vec<String>> {
        let rows =
            sqlx::query("SELECT DISTINCT metric_id FROM metric_source_map WHERE source_id = $1")
                .bind(source_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("metric_id").map_err(Into::into))
            .collect()
    }
}

/// Connection pool tuned for short read queries with a bounded statement
/// timeout, so a degraded database fails fast into the retry/breaker layer
/// instead of holding connections.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(300)))
        .max_lifetime(Some(Duration::from_secs(3600)))
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    info!(max_connections, "connected to PostgreSQL backing store");
    Ok(pool)
}
