// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod ingest;
pub mod metrics;
pub mod relevance;

pub use crate::api::router;

use std::sync::Arc;

use crate::api::AppState;
use crate::ingest::aggregator::Aggregator;
use crate::ingest::config::{load_registry_default, max_in_flight_from_env};
use crate::ingest::fetcher::HttpFetcher;
use crate::relevance::RelevanceHandle;

/// Aggregator over the configured registry, fetching over HTTP.
/// Registry lookup order is described in `ingest::config::load_registry_default`.
pub fn build_aggregator(relevance: RelevanceHandle) -> anyhow::Result<Aggregator> {
    let registry = load_registry_default()?;
    let fetcher = Arc::new(HttpFetcher::new()?);
    tracing::info!(target: "ingest", sources = registry.len(), "source registry loaded");
    Ok(Aggregator::new(registry, fetcher, relevance).with_max_in_flight(max_in_flight_from_env()))
}

/// HTTP surface over a shared aggregator.
pub fn app(aggregator: Arc<Aggregator>) -> axum::Router {
    router(AppState::new(aggregator))
}
