//! Scholarship Aggregator: Binary Entrypoint
//! Boots the Axum HTTP server, loads the source registry and keyword sets,
//! and starts the periodic aggregation scheduler.

use shuttle_axum::ShuttleAxum;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scholarship_aggregator::ingest::scheduler::{
    scheduler_enabled_from_env, spawn_scheduler, IngestSchedulerCfg,
};
use scholarship_aggregator::metrics::Metrics;
use scholarship_aggregator::relevance::{
    start_hot_reload_thread, RelevanceFilter, RelevanceHandle, DEFAULT_RELEVANCE_CONFIG_PATH,
    ENV_RELEVANCE_CONFIG_PATH,
};

/// Compact logs by default, JSON when LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ingest=info,scheduler=info,relevance=info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // The runtime may already have installed a subscriber; keep it if so.
    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    let _ = res;
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    // --- Relevance keyword sets (+ optional dev hot reload) ---
    let filter = RelevanceFilter::from_env()?;
    let relevance = RelevanceHandle::new(filter);
    let path = std::env::var(ENV_RELEVANCE_CONFIG_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_RELEVANCE_CONFIG_PATH));
    start_hot_reload_thread(relevance.clone(), path);

    // --- Pipeline ---
    let aggregator = Arc::new(scholarship_aggregator::build_aggregator(relevance)?);

    if scheduler_enabled_from_env() {
        let _ = spawn_scheduler(aggregator.clone(), IngestSchedulerCfg::from_env());
    } else {
        tracing::info!(target: "scheduler", "scheduler disabled");
    }

    let metrics = Metrics::init()?;
    let router = scholarship_aggregator::app(aggregator).merge(metrics.router());

    Ok(router.into())
}
