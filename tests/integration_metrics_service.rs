//! End-to-end pipeline tests for `MetricsService` against an in-memory
//! store double: cache-aside behavior, single-flight coalescing, retry and
//! circuit-breaker interplay, and source-scoped invalidation.

use async_trait::async_trait;
use benchmetrics::metrics::cache::CacheStore;
use benchmetrics::metrics::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use benchmetrics::metrics::error::{MetricsError, Result};
use benchmetrics::metrics::fetcher::ResilientFetcher;
use benchmetrics::metrics::models::RawMetricInputs;
use benchmetrics::metrics::registry::MetricRegistry;
use benchmetrics::metrics::retry::RetryConfig;
use benchmetrics::metrics::service::MetricsService;
use benchmetrics::metrics::store::BenchmarkStore;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store double with programmable data, failure injection, and latency.
struct MockStore {
    inputs: HashMap<String, RawMetricInputs>,
    source_map: HashMap<String, Vec<String>>,
    fetches: AtomicU32,
    /// Fail this many initial fetches with a transient error.
    fail_first: AtomicU32,
    fetch_delay: Duration,
    fail_source_lookup: bool,
}

impl MockStore {
    fn new() -> Self {
        let mut inputs = HashMap::new();
        inputs.insert(
            "revenue_growth".to_string(),
            RawMetricInputs {
                fields: fields(&[("current_arr", 1_200_000.0), ("previous_arr", 1_000_000.0)]),
                benchmark_population: vec![-5.0, 8.0, 12.0, 20.0, 35.0, 50.0, 80.0, 120.0],
            },
        );
        inputs.insert(
            "ebitda_margin".to_string(),
            RawMetricInputs {
                fields: fields(&[("ebitda", 300_000.0), ("revenue", 2_000_000.0)]),
                benchmark_population: vec![-40.0, -20.0, -5.0, 0.0, 10.0, 18.0, 25.0],
            },
        );

        let mut source_map = HashMap::new();
        source_map.insert(
            "finance-db".to_string(),
            vec!["revenue_growth".to_string(), "ebitda_margin".to_string()],
        );

        Self {
            inputs,
            source_map,
            fetches: AtomicU32::new(0),
            fail_first: AtomicU32::new(0),
            fetch_delay: Duration::ZERO,
            fail_source_lookup: false,
        }
    }

    fn failing_first(self, failures: u32) -> Self {
        self.fail_first.store(failures, Ordering::SeqCst);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn fields(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[async_trait]
impl BenchmarkStore for MockStore {
    async fn fetch_raw_inputs(&self, metric_id: &str) -> Result<RawMetricInputs> {
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(MetricsError::Database {
                message: "connection refused".to_string(),
            });
        }

        self.inputs
            .get(metric_id)
            .cloned()
            .ok_or_else(|| MetricsError::NotFound {
                metric_id: metric_id.to_string(),
            })
    }

    async fn metric_ids_for_source(&self, source_id: &str) -> Result<Vec<String>> {
        if self.fail_source_lookup {
            return Err(MetricsError::Database {
                message: "source lookup failed".to_string(),
            });
        }
        Ok(self.source_map.get(source_id).cloned().unwrap_or_default())
    }
}

struct Harness {
    service: Arc<MetricsService>,
    store: Arc<MockStore>,
    cache: Arc<CacheStore>,
    breaker: Arc<CircuitBreaker>,
}

fn harness(store: MockStore) -> Harness {
    harness_with(store, 5, 3)
}

fn harness_with(store: MockStore, failure_threshold: u32, max_attempts: u32) -> Harness {
    let store = Arc::new(store);
    let cache = Arc::new(CacheStore::new(900));
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold,
        reset_timeout: Duration::from_millis(100),
    }));
    let fetcher = Arc::new(ResilientFetcher::new(
        breaker.clone(),
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            jitter: false,
            ..Default::default()
        },
        Duration::from_secs(1),
    ));
    let service = Arc::new(MetricsService::new(
        Arc::new(MetricRegistry::builtin()),
        cache.clone(),
        store.clone(),
        fetcher,
    ));
    Harness {
        service,
        store,
        cache,
        breaker,
    }
}

#[tokio::test]
async fn cold_cache_computes_and_warm_cache_serves() {
    let h = harness(MockStore::new());

    let first = h.service.get_metric("revenue_growth").await.unwrap();
    assert_eq!(first.value, 20.0);
    assert_eq!(h.store.fetch_count(), 1);

    let second = h.service.get_metric("revenue_growth").await.unwrap();
    assert_eq!(second.value, 20.0);
    assert_eq!(second.computed_at, first.computed_at);
    assert_eq!(h.store.fetch_count(), 1, "warm read must not touch the store");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_calls_trigger_exactly_one_fetch() {
    let h = harness(MockStore::new().with_delay(Duration::from_millis(50)));

    let calls = (0..8).map(|_| {
        let service = h.service.clone();
        tokio::spawn(async move { service.get_metric("revenue_growth").await })
    });
    let results = join_all(calls).await;

    let mut values = Vec::new();
    for joined in results {
        values.push(joined.unwrap().unwrap().value);
    }
    assert!(values.iter().all(|v| *v == 20.0));
    assert_eq!(
        h.store.fetch_count(),
        1,
        "single-flight must coalesce concurrent misses"
    );
}

#[tokio::test]
async fn transient_store_failures_are_retried_to_success() {
    let h = harness(MockStore::new().failing_first(2));

    let result = h.service.get_metric("revenue_growth").await.unwrap();
    assert_eq!(result.value, 20.0);
    assert_eq!(h.store.fetch_count(), 3);
    assert_eq!(h.breaker.stats().await.consecutive_failures, 0);
}

#[tokio::test]
async fn persistent_failure_opens_circuit_and_signals_unavailability() {
    let h = harness_with(MockStore::new().failing_first(u32::MAX), 1, 2);

    let err = h.service.get_metric("revenue_growth").await.unwrap_err();
    assert!(
        matches!(err, MetricsError::ServiceUnavailable { .. }),
        "expected ServiceUnavailable, got {err:?}"
    );
    assert_eq!(h.breaker.state().await, CircuitState::Open);
    let fetches_so_far = h.store.fetch_count();

    // Circuit is open: the next call is rejected before any store contact.
    let err = h.service.get_metric("revenue_growth").await.unwrap_err();
    assert_eq!(err, MetricsError::CircuitOpen);
    assert_eq!(h.store.fetch_count(), fetches_so_far);
}

#[tokio::test]
async fn circuit_recovery_serves_fresh_data() {
    let h = harness_with(MockStore::new().failing_first(1), 1, 1);

    let _ = h.service.get_metric("revenue_growth").await.unwrap_err();
    let _ = h.service.get_metric("revenue_growth").await.unwrap_err();
    assert_eq!(h.breaker.state().await, CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Half-open trial succeeds and the pipeline completes end to end.
    let result = h.service.get_metric("revenue_growth").await.unwrap();
    assert_eq!(result.value, 20.0);
    assert_eq!(h.breaker.state().await, CircuitState::Closed);
}

#[tokio::test]
async fn missing_store_data_is_not_found_not_unavailable() {
    let h = harness(MockStore::new());

    let err = h.service.get_metric("magic_number").await.unwrap_err();
    assert!(matches!(err, MetricsError::NotFound { .. }));
    // Deterministic miss: no retries burned against the store.
    assert_eq!(h.store.fetch_count(), 1);
}

#[tokio::test]
async fn source_invalidation_forces_recomputation() {
    let h = harness(MockStore::new());

    h.service.get_metric("revenue_growth").await.unwrap();
    h.service.get_metric("ebitda_margin").await.unwrap();
    assert_eq!(h.store.fetch_count(), 2);

    let removed = h.service.invalidate_source("finance-db").await.unwrap();
    assert_eq!(removed, 2);

    h.service.get_metric("revenue_growth").await.unwrap();
    assert_eq!(h.store.fetch_count(), 3);
}

#[tokio::test]
async fn unknown_source_invalidates_nothing() {
    let h = harness(MockStore::new());
    h.service.get_metric("revenue_growth").await.unwrap();

    let removed = h.service.invalidate_source("marketing-db").await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(h.cache.len().await, 1);
}

#[tokio::test]
async fn failed_source_lookup_falls_back_to_full_purge() {
    let mut store = MockStore::new();
    store.fail_source_lookup = true;
    let h = harness(store);

    h.service.get_metric("revenue_growth").await.unwrap();
    h.service.get_metric("ebitda_margin").await.unwrap();

    let removed = h.service.invalidate_source("finance-db").await.unwrap();
    assert_eq!(removed, 2);
    assert!(h.cache.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_caller_does_not_abort_the_computation() {
    let h = harness(MockStore::new().with_delay(Duration::from_millis(80)));

    let service = h.service.clone();
    let caller = tokio::spawn(async move { service.get_metric("revenue_growth").await });

    // Cancel the caller while the fetch is still in flight.
    tokio::time::sleep(Duration::from_millis(20)).await;
    caller.abort();
    let _ = caller.await;

    // The spawned computation finished and populated the cache anyway.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let result = h.service.get_metric("revenue_growth").await.unwrap();
    assert_eq!(result.value, 20.0);
    assert_eq!(h.store.fetch_count(), 1);
}

#[tokio::test]
async fn validation_failures_surface_with_field_context() {
    let mut store = MockStore::new();
    store.inputs.insert(
        "gross_margin".to_string(),
        RawMetricInputs {
            fields: fields(&[("revenue", 1_000_000.0)]),
            benchmark_population: vec![40.0, 55.0, 62.0, 70.0, 78.0],
        },
    );
    let h = harness(store);

    let err = h.service.get_metric("gross_margin").await.unwrap_err();
    match err {
        MetricsError::MissingFields { metric_id, fields } => {
            assert_eq!(metric_id, "gross_margin");
            assert_eq!(fields, vec!["cogs".to_string()]);
        }
        other => panic!("expected MissingFields, got {other:?}"),
    }
    // Deterministic error: not retried.
    assert_eq!(h.store.fetch_count(), 1);
}

#[tokio::test]
async fn small_benchmark_population_is_rejected() {
    let mut store = MockStore::new();
    store.inputs.insert(
        "rule_of_40".to_string(),
        RawMetricInputs {
            fields: fields(&[("growth_rate", 30.0), ("profit_margin", 5.0)]),
            benchmark_population: vec![10.0, 20.0, 30.0],
        },
    );
    let h = harness(store);

    let err = h.service.get_metric("rule_of_40").await.unwrap_err();
    assert_eq!(
        err,
        MetricsError::InsufficientData {
            required: 5,
            actual: 3,
        }
    );
}
