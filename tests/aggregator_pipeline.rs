// tests/aggregator_pipeline.rs
//
// Full pipeline against a local mock server: real HttpFetcher, real
// extractors, default keyword sets.

use std::sync::Arc;

use chrono::NaiveDate;
use httpmock::prelude::*;

use scholarship_aggregator::ingest::aggregator::Aggregator;
use scholarship_aggregator::ingest::config::SourceRegistry;
use scholarship_aggregator::ingest::fetcher::HttpFetcher;
use scholarship_aggregator::ingest::types::{
    Category, Mechanism, Provenance, SelectorSet, SourceDescriptor,
};
use scholarship_aggregator::relevance::RelevanceHandle;

const PAGE: &str = include_str!("fixtures/scholarships_page.html");
const RSS: &str = include_str!("fixtures/scholarships_rss.xml");
const ATOM: &str = include_str!("fixtures/scholarships_atom.xml");
const API: &str = include_str!("fixtures/scholarships_api.json");

fn page_selectors() -> SelectorSet {
    SelectorSet {
        container: ".scholarship".into(),
        title: "h3".into(),
        amount: ".amount".into(),
        deadline: ".deadline".into(),
        description: "p".into(),
    }
}

fn aggregator(sources: Vec<SourceDescriptor>) -> Aggregator {
    Aggregator::new(
        SourceRegistry::new(sources).expect("valid registry"),
        Arc::new(HttpFetcher::new().expect("client")),
        RelevanceHandle::default(),
    )
}

async fn serve(server: &MockServer, path: &str, status: u16, body: &'static str) {
    server
        .mock_async(|when, then| {
            when.method(GET).path(path);
            then.status(status).body(body);
        })
        .await;
}

#[tokio::test]
async fn failing_middle_source_does_not_affect_neighbours() {
    let server = MockServer::start_async().await;
    serve(&server, "/list", 200, PAGE).await;
    serve(&server, "/broken.xml", 404, "gone").await;
    serve(&server, "/api", 200, API).await;

    let agg = aggregator(vec![
        SourceDescriptor::new(
            "Portal",
            server.url("/list"),
            Mechanism::Document {
                selectors: page_selectors(),
            },
        ),
        SourceDescriptor::new("Broken Feed", server.url("/broken.xml"), Mechanism::Feed),
        SourceDescriptor::new("Partner API", server.url("/api"), Mechanism::plain_api()),
    ]);

    let batch = agg.run_all(Category::All).await;

    assert_eq!(batch.count, 2);
    assert_eq!(batch.count, batch.records.len());
    assert_eq!(batch.records[0].title, "Merit Scholarship");
    assert_eq!(batch.records[1].title, "African Leaders Fellowship");

    assert_eq!(batch.sources.len(), 3);
    assert!(batch.sources[0].error.is_none());
    assert!(batch.sources[1]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("404")));
    assert_eq!(batch.sources[1].kept, 0);
    assert_eq!(batch.sources[2].skipped, 1, "non-object API entry is skipped");
    assert_eq!(
        batch.sources.iter().map(|s| s.kept).sum::<usize>(),
        batch.count
    );
}

#[tokio::test]
async fn repeated_and_parallel_runs_keep_registry_order() {
    let server = MockServer::start_async().await;
    serve(&server, "/rss", 200, RSS).await;
    serve(&server, "/atom", 200, ATOM).await;
    serve(&server, "/api", 200, API).await;

    let sources = vec![
        SourceDescriptor::new("Desk", server.url("/rss"), Mechanism::Feed),
        SourceDescriptor::new("Atom", server.url("/atom"), Mechanism::Feed),
        SourceDescriptor::new("Partner API", server.url("/api"), Mechanism::plain_api()),
    ];

    let sequential = aggregator(sources.clone());
    let first = sequential.run_all(Category::All).await;
    let second = sequential.run_all(Category::All).await;
    assert_eq!(first.records, second.records);

    let parallel = aggregator(sources).with_max_in_flight(3);
    let third = parallel.run_all(Category::All).await;
    assert_eq!(first.records, third.records);

    let titles: Vec<_> = first.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Chevening Scholarships for International Students",
            "Lagos State Undergraduate Bursary",
            "Mastercard Foundation Scholars Program",
            "African Leaders Fellowship",
        ]
    );
}

#[tokio::test]
async fn document_run_yields_normalized_relevant_record() {
    let server = MockServer::start_async().await;
    serve(&server, "/list", 200, PAGE).await;

    let agg = aggregator(vec![]);
    let batch = agg
        .run_document(&server.url("/list"), Some(page_selectors()))
        .await
        .expect("endpoint supplied");

    assert_eq!(batch.count, 1);
    let rec = &batch.records[0];
    assert_eq!(rec.title, "Merit Scholarship");
    assert_eq!(rec.amount, 1000);
    assert_eq!(rec.deadline, NaiveDate::from_ymd_opt(2025, 12, 31));
    assert_eq!(rec.description, "For STEM students in Lagos");
    assert_eq!(rec.source_url, server.url("/apply/merit"));
    assert_eq!(rec.provenance, Provenance::DocumentScrape);

    // County-only item is dropped by relevance, the untitled one by extraction.
    assert_eq!(batch.sources[0].candidates, 2);
    assert_eq!(batch.sources[0].skipped, 1);
}

#[tokio::test]
async fn feed_dates_and_amounts_are_normalized() {
    let server = MockServer::start_async().await;
    serve(&server, "/rss", 200, RSS).await;

    let agg = aggregator(vec![]);
    let batch = agg.run_feed(&server.url("/rss")).await.unwrap();

    assert_eq!(batch.count, 2, "Ohio-only item is filtered out");
    assert_eq!(batch.records[0].amount, 18_000);
    assert_eq!(batch.records[0].deadline, NaiveDate::from_ymd_opt(2025, 1, 6));
    assert_eq!(batch.records[0].source_url, "https://desk.test/chevening");
    assert_eq!(batch.records[1].amount, 150_000);
    assert!(batch
        .records
        .iter()
        .all(|r| r.provenance == Provenance::Feed));
}

#[tokio::test]
async fn category_filter_limits_fetched_sources() {
    let server = MockServer::start_async().await;
    let feed = server
        .mock_async(|when, then| {
            when.method(GET).path("/rss");
            then.status(200).body(RSS);
        })
        .await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/list");
            then.status(200).body(PAGE);
        })
        .await;

    let agg = aggregator(vec![
        SourceDescriptor::new(
            "Portal",
            server.url("/list"),
            Mechanism::Document {
                selectors: page_selectors(),
            },
        ),
        SourceDescriptor::new("Desk", server.url("/rss"), Mechanism::Feed),
    ]);

    let batch = agg.run_all(Category::Feed).await;
    assert_eq!(batch.sources.len(), 1);
    assert_eq!(batch.sources[0].source, "Desk");
    feed.assert_hits_async(1).await;
    page.assert_hits_async(0).await;
}

#[tokio::test]
async fn named_sources_and_samples() {
    let server = MockServer::start_async().await;
    serve(&server, "/rss", 200, RSS).await;

    let agg = aggregator(vec![SourceDescriptor::new(
        "Desk",
        server.url("/rss"),
        Mechanism::Feed,
    )]);

    let sample = agg.test_source("Desk").await.unwrap();
    assert_eq!(sample.count, 2);
    assert_eq!(sample.sample.len(), 2);

    assert!(agg.run_named("desk").await.is_err(), "lookup is exact");
}
