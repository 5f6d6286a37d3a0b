use anyhow::Result;
use benchmetrics::config::Config;
use benchmetrics::metrics::{
    cache::CacheStore,
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    fetcher::ResilientFetcher,
    registry::MetricRegistry,
    retry::RetryConfig,
    service::MetricsService,
    store::{create_pool, PostgresBenchmarkStore},
};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "benchmetrics")]
#[command(about = "Benchmarking metrics engine - compute and cache SaaS benchmark KPIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one metric and print the full result as JSON
    Compute {
        /// Metric id, e.g. revenue_growth
        metric_id: String,
    },
    /// List the metric definitions in the registry
    Definitions,
    /// Purge cached metrics derived from a data source
    InvalidateSource {
        /// Data source id as known to the admin subsystem
        source_id: String,
    },
    /// Check backing store connectivity and circuit state
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Definitions => {
            // Registry-only command; no database connection needed.
            let registry = MetricRegistry::builtin();
            let mut defs: Vec<_> = registry.iter().collect();
            defs.sort_by(|a, b| a.id.cmp(&b.id));
            println!("{}", serde_json::to_string_pretty(&defs)?);
            Ok(())
        }
        Commands::Compute { metric_id } => {
            let service = build_service(&config).await?;
            let result = service.get_metric(&metric_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::InvalidateSource { source_id } => {
            let service = build_service(&config).await?;
            let removed = service.invalidate_source(&source_id).await?;
            println!("Invalidated {removed} cached entries for source {source_id}");
            Ok(())
        }
        Commands::Health => {
            let pool = create_pool(&config.database_url, config.operational.max_db_connections)
                .await?;
            let store = PostgresBenchmarkStore::new(pool);
            let healthy = store.check_health().await?;
            println!(
                "backing store: {}",
                if healthy { "healthy" } else { "unreachable" }
            );
            Ok(())
        }
    }
}

async fn build_service(config: &Config) -> Result<MetricsService> {
    let pool =
        create_pool(&config.database_url, config.operational.max_db_connections).await?;
    let store = Arc::new(PostgresBenchmarkStore::new(pool));

    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
        failure_threshold: config.circuit.failure_threshold,
        reset_timeout: Duration::from_millis(config.circuit.reset_timeout_ms),
    }));
    let fetcher = Arc::new(ResilientFetcher::new(
        breaker,
        RetryConfig {
            max_attempts: config.retry.max_attempts,
            initial_delay: Duration::from_millis(config.retry.base_delay_ms),
            max_delay: Duration::from_millis(config.retry.max_delay_ms),
            backoff_multiplier: config.retry.backoff_multiplier,
            jitter: config.retry.jitter,
        },
        Duration::from_secs(config.operational.store_timeout_seconds),
    ));

    Ok(MetricsService::new(
        Arc::new(MetricRegistry::builtin()),
        Arc::new(CacheStore::new(config.cache.ttl_seconds)),
        store,
        fetcher,
    ))
}
