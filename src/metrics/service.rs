//! Orchestration of the metrics pipeline.
//!
//! `MetricsService` owns the cache-aside flow: registry fast-fail, cache
//! read, per-key single-flight computation, resilient store fetch, formula
//! and statistics evaluation, cache population, and fan-out of the result
//! to every concurrent caller of the same metric id.
//!
//! The computation for a cache miss runs on a spawned task and publishes
//! through a watch channel. Callers only await the channel, so a cancelled
//! caller stops waiting without aborting the computation — the cache is
//! still populated for the remaining waiters and for future calls.

use super::cache::CacheStore;
use super::circuit_breaker::{CircuitBreakerStats, CircuitState};
use super::distribution::{DistributionBinner, HistogramOptions};
use super::error::{MetricsError, Result};
use super::fetcher::ResilientFetcher;
use super::formula::FormulaEngine;
use super::models::{MetricDefinition, MetricResult};
use super::registry::MetricRegistry;
use super::statistics::PercentileStatistics;
use super::store::BenchmarkStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Prefix for every cached metric payload; `metrics:*` purges them all.
pub const CACHE_KEY_PREFIX: &str = "metrics:";

pub fn cache_key(metric_id: &str) -> String {
    format!("{CACHE_KEY_PREFIX}{metric_id}")
}

type SharedOutcome = std::result::Result<MetricResult, MetricsError>;
type InFlightMap = HashMap<String, watch::Receiver<Option<SharedOutcome>>>;

pub struct MetricsService {
    registry: Arc<MetricRegistry>,
    cache: Arc<CacheStore>,
    store: Arc<dyn BenchmarkStore>,
    fetcher: Arc<ResilientFetcher>,
    in_flight: Arc<Mutex<InFlightMap>>,
    histogram_opts: HistogramOptions,
}

impl MetricsService {
    pub fn new(
        registry: Arc<MetricRegistry>,
        cache: Arc<CacheStore>,
        store: Arc<dyn BenchmarkStore>,
        fetcher: Arc<ResilientFetcher>,
    ) -> Self {
        Self {
            registry,
            cache,
            store,
            fetcher,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            histogram_opts: HistogramOptions::default(),
        }
    }

    pub fn with_histogram_options(mut self, opts: HistogramOptions) -> Self {
        self.histogram_opts = opts;
        self
    }

    /// Fetch-or-compute the full result for one metric.
    pub async fn get_metric(&self, metric_id: &str) -> Result<MetricResult> {
        let definition = self
            .registry
            .get(metric_id)
            .ok_or_else(|| MetricsError::NotFound {
                metric_id: metric_id.to_string(),
            })?
            .clone();

        let key = cache_key(metric_id);
        if let Some(payload) = self.cache.get(&key).await {
            match serde_json::from_value::<MetricResult>(payload) {
                Ok(result) => {
                    debug!(metric_id, "cache hit");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(metric_id, error = %e, "corrupt cache payload, recomputing");
                    self.cache.invalidate(&key).await;
                }
            }
        }

        let mut rx = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(&key) {
                Some(rx) => {
                    debug!(metric_id, "joining in-flight computation");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.clone(), rx.clone());
                    self.spawn_computation(definition, key.clone(), tx);
                    rx
                }
            }
        };

        loop {
            if let Some(outcome) = rx.borrow_and_update().as_ref() {
                return outcome.clone();
            }
            if rx.changed().await.is_err() {
                // The computation task died without publishing; clear the
                // guard so the next caller starts fresh.
                self.in_flight.lock().await.remove(&key);
                return Err(MetricsError::ServiceUnavailable {
                    reason: "metric computation aborted".to_string(),
                });
            }
        }
    }

    fn spawn_computation(
        &self,
        definition: MetricDefinition,
        key: String,
        tx: watch::Sender<Option<SharedOutcome>>,
    ) {
        let cache = Arc::clone(&self.cache);
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let in_flight = Arc::clone(&self.in_flight);
        let opts = self.histogram_opts;

        tokio::spawn(async move {
            let outcome = compute_metric(&definition, &cache, &store, &fetcher, opts, &key).await;
            // Drop the guard before publishing: waiters hold their own
            // receiver clones, and later callers go through the cache.
            in_flight.lock().await.remove(&key);
            let _ = tx.send(Some(outcome));
        });
    }

    /// Purge cached values derived from a data source; called by the admin
    /// subsystem when a source is updated. Returns the entries removed.
    pub async fn invalidate_source(&self, source_id: &str) -> Result<usize> {
        match self.store.metric_ids_for_source(source_id).await {
            Ok(metric_ids) => {
                let mut removed = 0;
                for metric_id in &metric_ids {
                    removed += self.cache.invalidate(&cache_key(metric_id)).await;
                }
                info!(source_id, metrics = metric_ids.len(), removed, "invalidated source");
                Ok(removed)
            }
            Err(e) => {
                // Over-invalidating is safe; serving stale data after an
                // admin write is not.
                warn!(source_id, error = %e, "source lookup failed, purging all cached metrics");
                Ok(self.cache.invalidate("metrics:*").await)
            }
        }
    }

    pub async fn circuit_stats(&self) -> CircuitBreakerStats {
        self.fetcher.breaker().stats().await
    }
}

async fn compute_metric(
    definition: &MetricDefinition,
    cache: &CacheStore,
    store: &Arc<dyn BenchmarkStore>,
    fetcher: &ResilientFetcher,
    opts: HistogramOptions,
    key: &str,
) -> SharedOutcome {
    let metric_id = definition.id.clone();

    let fetched = fetcher
        .call("fetch_raw_inputs", || {
            let store = Arc::clone(store);
            let metric_id = metric_id.clone();
            async move { store.fetch_raw_inputs(&metric_id).await }
        })
        .await;

    let raw = match fetched {
        Ok(raw) => raw,
        Err(e) => return Err(surface_fetch_error(e, fetcher).await),
    };

    let value = FormulaEngine::compute(definition, &raw.fields)?;
    let percentiles = PercentileStatistics::percentiles(&raw.benchmark_population)?;
    let distribution = DistributionBinner::histogram(&raw.benchmark_population, opts)?;

    let result = MetricResult {
        metric_id,
        value,
        unit: definition.unit,
        percentiles,
        distribution,
        computed_at: Utc::now(),
    };

    match serde_json::to_value(&result) {
        Ok(payload) => cache.set_default(key, payload).await,
        // A correct result is worth returning even if it could not be
        // cached; the next call recomputes.
        Err(e) => warn!(metric_id = %result.metric_id, error = %e, "failed to cache result"),
    }

    info!(metric_id = %result.metric_id, value = result.value, "computed metric");
    Ok(result)
}

/// Distinguish "backing store is down" from "data doesn't exist": a
/// transient failure that left (or found) the circuit open surfaces as
/// service-unavailable so callers can back off rather than report a gap.
async fn surface_fetch_error(error: MetricsError, fetcher: &ResilientFetcher) -> MetricsError {
    if error.is_transient() && fetcher.breaker().state().await == CircuitState::Open {
        return MetricsError::ServiceUnavailable {
            reason: error.to_string(),
        };
    }
    error
}
