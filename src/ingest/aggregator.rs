// src/ingest/aggregator.rs
//! Fetch → extract → normalize → filter, per source, merged in registry order.
//! A failing source contributes zero records and never aborts the batch.

use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ingest::config::SourceRegistry;
use crate::ingest::error::{ConfigError, SourceError};
use crate::ingest::fetcher::{Fetch, FetchRequest};
use crate::ingest::normalize::normalize_candidate;
use crate::ingest::providers;
use crate::ingest::types::{
    BatchResult, Category, Mechanism, ScholarshipRecord, SelectorSet, SourceDescriptor,
    SourceOutcome,
};
use crate::relevance::RelevanceHandle;

/// Records in a "test a source" sample.
pub const SAMPLE_SIZE: usize = 3;

/// Successful run of one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub records: Vec<ScholarshipRecord>,
    pub candidates: usize,
    pub skipped: usize,
    pub filtered: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSample {
    pub count: usize,
    pub sample: Vec<ScholarshipRecord>,
}

pub struct Aggregator {
    registry: SourceRegistry,
    fetcher: Arc<dyn Fetch>,
    relevance: RelevanceHandle,
    max_in_flight: usize,
}

impl Aggregator {
    pub fn new(registry: SourceRegistry, fetcher: Arc<dyn Fetch>, relevance: RelevanceHandle) -> Self {
        Self {
            registry,
            fetcher,
            relevance,
            max_in_flight: 1,
        }
    }

    /// Sources fetched concurrently per run; output order is unaffected.
    pub fn with_max_in_flight(mut self, n: usize) -> Self {
        self.max_in_flight = n.max(1);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn request_for(source: &SourceDescriptor) -> FetchRequest {
        let mut req = FetchRequest::get(source.endpoint.trim());
        if let Mechanism::Api {
            headers, params, ..
        } = &source.mechanism
        {
            req.headers = headers.clone();
            req.params = params.clone();
        }
        req
    }

    /// Run one source through the whole pipeline.
    pub async fn run_source(&self, source: &SourceDescriptor) -> Result<SourceReport, SourceError> {
        let req = Self::request_for(source);
        let body = self.fetcher.fetch(&req).await?;
        let extraction = providers::extract(&source.mechanism, &body, &req.endpoint)?;

        let provenance = source.mechanism.provenance();
        let candidates = extraction.candidates.len();
        let mut report = SourceReport {
            candidates,
            skipped: extraction.skipped.len(),
            ..Default::default()
        };
        for c in extraction.candidates {
            let rec = normalize_candidate(c, &req.endpoint, provenance);
            if self.relevance.is_relevant(&rec) {
                report.records.push(rec);
            } else {
                report.filtered += 1;
            }
        }
        Ok(report)
    }

    /// Run the given sources and merge survivors in the order supplied.
    pub async fn run_sources<'a, I>(&self, sources: I) -> BatchResult
    where
        I: IntoIterator<Item = &'a SourceDescriptor>,
    {
        crate::ingest::ensure_metrics_described();

        let sources: Vec<SourceDescriptor> = sources.into_iter().cloned().collect();
        let results: Vec<(SourceDescriptor, Result<SourceReport, SourceError>)> =
            stream::iter(sources)
                .map(|s| async move {
                    let r = self.run_source(&s).await;
                    (s, r)
                })
                .buffered(self.max_in_flight)
                .collect()
                .await;

        let mut batch = BatchResult::default();
        for (source, result) in results {
            counter!("ingest_sources_total").increment(1);
            let outcome = match result {
                Ok(report) => {
                    info!(
                        target: "ingest",
                        source = %source.name,
                        candidates = report.candidates,
                        kept = report.records.len(),
                        "source processed"
                    );
                    counter!("ingest_candidates_total").increment(report.candidates as u64);
                    counter!("ingest_items_skipped_total").increment(report.skipped as u64);
                    counter!("ingest_filtered_total").increment(report.filtered as u64);
                    counter!("ingest_kept_total").increment(report.records.len() as u64);
                    let outcome = SourceOutcome {
                        source: source.name,
                        mechanism: source.mechanism.label(),
                        candidates: report.candidates,
                        skipped: report.skipped,
                        kept: report.records.len(),
                        error: None,
                    };
                    batch.records.extend(report.records);
                    outcome
                }
                Err(e) => {
                    warn!(target: "ingest", source = %source.name, error = %e, "source failed");
                    counter!("ingest_source_errors_total").increment(1);
                    SourceOutcome {
                        source: source.name,
                        mechanism: source.mechanism.label(),
                        candidates: 0,
                        skipped: 0,
                        kept: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            batch.sources.push(outcome);
        }

        batch.count = batch.records.len();
        gauge!("ingest_pipeline_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        batch
    }

    /// Full-registry run, optionally restricted to one category.
    pub async fn run_all(&self, category: Category) -> BatchResult {
        self.run_sources(self.registry.in_category(category)).await
    }

    /// Caller-supplied document source; selectors default to the first
    /// registered document source's.
    pub async fn run_document(
        &self,
        endpoint: &str,
        selectors: Option<SelectorSet>,
    ) -> Result<BatchResult, ConfigError> {
        let endpoint = required(endpoint)?;
        let selectors = match selectors {
            Some(s) => s,
            None => self
                .registry
                .default_selectors()
                .cloned()
                .ok_or(ConfigError::NoDefaultSelectors)?,
        };
        let desc = SourceDescriptor::new(endpoint, endpoint, Mechanism::Document { selectors });
        Ok(self.run_sources([&desc]).await)
    }

    pub async fn run_feed(&self, url: &str) -> Result<BatchResult, ConfigError> {
        let url = required(url)?;
        let desc = SourceDescriptor::new(url, url, Mechanism::Feed);
        Ok(self.run_sources([&desc]).await)
    }

    pub async fn run_api(
        &self,
        endpoint: &str,
        headers: BTreeMap<String, String>,
        params: BTreeMap<String, String>,
    ) -> Result<BatchResult, ConfigError> {
        let endpoint = required(endpoint)?;
        let desc = SourceDescriptor::new(
            endpoint,
            endpoint,
            Mechanism::Api {
                headers,
                params,
                items_key: None,
            },
        );
        Ok(self.run_sources([&desc]).await)
    }

    /// Run a registered source by exact name.
    pub async fn run_named(&self, name: &str) -> Result<BatchResult, ConfigError> {
        let source = self
            .registry
            .find(name)
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))?;
        Ok(self.run_sources([source]).await)
    }

    /// Run a registered source and keep only the first few records.
    pub async fn test_source(&self, name: &str) -> Result<SourceSample, ConfigError> {
        let batch = self.run_named(name).await?;
        Ok(SourceSample {
            count: batch.count,
            sample: batch.sample(SAMPLE_SIZE).to_vec(),
        })
    }
}

fn required(endpoint: &str) -> Result<&str, ConfigError> {
    let e = endpoint.trim();
    if e.is_empty() {
        Err(ConfigError::MissingEndpoint)
    } else {
        Ok(e)
    }
}
