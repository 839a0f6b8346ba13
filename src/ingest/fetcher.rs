// src/ingest/fetcher.rs
//! Network retrieval for one source. Bounded timeout, fixed client signature,
//! failures returned as [`FetchError`] and never panicked past this boundary.

use async_trait::async_trait;
use metrics::histogram;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::ingest::error::FetchError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const CLIENT_SIGNATURE: &str =
    "Mozilla/5.0 (compatible; ScholarshipAggregator/1.0; +https://github.com/lumlich/scholarship-aggregator)";

/// What to retrieve. Headers are merged over the default signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// Seam used by the aggregator; tests substitute in-memory fetchers.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<String, FetchError>;
}

/// `reqwest`-backed fetcher. No retries at this layer.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(CLIENT_SIGNATURE)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    fn header_map(req: &FetchRequest) -> Result<HeaderMap, FetchError> {
        let mut map = HeaderMap::new();
        for (k, v) in &req.headers {
            let invalid = || FetchError::InvalidHeader {
                endpoint: req.endpoint.clone(),
                name: k.clone(),
            };
            let name = HeaderName::from_bytes(k.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(v).map_err(|_| invalid())?;
            map.insert(name, value);
        }
        Ok(map)
    }

    async fn get_body(&self, req: &FetchRequest, headers: HeaderMap) -> Result<String, FetchError> {
        let mut builder = self.client.get(&req.endpoint);
        if !req.params.is_empty() {
            builder = builder.query(&req.params);
        }
        // Request-level headers take precedence over the client defaults.
        let resp = builder
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&req.endpoint, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: req.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        resp.text()
            .await
            .map_err(|e| FetchError::from_reqwest(&req.endpoint, e))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<String, FetchError> {
        let headers = Self::header_map(req)?;

        // Recorded for failures too.
        let t0 = std::time::Instant::now();
        let result = self.get_body(req, headers).await;
        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn sends_signature_and_returns_body() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/list")
                    .header("user-agent", CLIENT_SIGNATURE);
                then.status(200).body("<html></html>");
            })
            .await;

        let f = HttpFetcher::new().unwrap();
        let body = f.fetch(&FetchRequest::get(server.url("/list"))).await.unwrap();
        m.assert_async().await;
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn caller_headers_and_params_are_applied() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api")
                    .header("x-api-key", "k1")
                    .header("user-agent", "custom-agent")
                    .query_param("country", "NG");
                then.status(200).body("[]");
            })
            .await;

        let mut req = FetchRequest::get(server.url("/api"));
        req.headers.insert("x-api-key".into(), "k1".into());
        req.headers.insert("User-Agent".into(), "custom-agent".into());
        req.params.insert("country".into(), "NG".into());

        let body = HttpFetcher::new().unwrap().fetch(&req).await.unwrap();
        m.assert_async().await;
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/gone");
                then.status(404);
            })
            .await;

        let endpoint = server.url("/gone");
        let err = HttpFetcher::new()
            .unwrap()
            .fetch(&FetchRequest::get(endpoint.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(err.endpoint(), endpoint);
    }

    #[tokio::test]
    async fn slow_host_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/slow");
                then.status(200).delay(Duration::from_millis(500)).body("late");
            })
            .await;

        let f = HttpFetcher::with_timeout(Duration::from_millis(50)).unwrap();
        let err = f.fetch(&FetchRequest::get(server.url("/slow"))).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
    }

    #[test]
    fn failed_fetches_are_timed_too() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let server = MockServer::start();
        server.mock(|when, then| {
            when.path("/down");
            then.status(503);
        });

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let res = metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                HttpFetcher::new()
                    .unwrap()
                    .fetch(&FetchRequest::get(server.url("/down")))
                    .await
            })
        });

        assert!(matches!(res, Err(FetchError::Status { status: 503, .. })));
        assert!(handle.render().contains("ingest_fetch_ms"));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let mut req = FetchRequest::get("https://example.test");
        req.headers.insert("bad header".into(), "v".into());
        let err = HttpFetcher::header_map(&req).unwrap_err();
        assert!(matches!(err, FetchError::InvalidHeader { .. }));
    }
}
