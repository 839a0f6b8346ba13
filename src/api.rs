use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::ingest::aggregator::{Aggregator, SourceSample};
use crate::ingest::error::ConfigError;
use crate::ingest::types::{
    BatchResult, Category, ScholarshipRecord, SelectorSet, SourceOutcome,
};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/sources", get(list_sources))
        .route("/scholarships/aggregate", post(aggregate))
        .route("/scholarships/scrape", post(scrape))
        .route("/scholarships/feed", post(feed))
        .route("/scholarships/api", post(api_source))
        .route("/sources/{name}/run", post(run_source))
        .route("/sources/{name}/test", post(test_source))
        .with_state(state)
}

/* ----------------------------
Request / response shapes
---------------------------- */

#[derive(Deserialize, Default)]
struct AggregateQuery {
    #[serde(default)]
    category: Category,
}

#[derive(Deserialize)]
struct ScrapeReq {
    #[serde(default)]
    url: String,
    #[serde(default)]
    selectors: Option<SelectorSet>,
}

#[derive(Deserialize)]
struct FeedReq {
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct ApiReq {
    #[serde(default)]
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct BatchResp {
    success: bool,
    count: usize,
    scholarships: Vec<ScholarshipRecord>,
    sources: Vec<SourceOutcome>,
}

impl From<BatchResult> for BatchResp {
    fn from(b: BatchResult) -> Self {
        Self {
            success: true,
            count: b.count,
            scholarships: b.records,
            sources: b.sources,
        }
    }
}

#[derive(Serialize)]
struct SampleResp {
    success: bool,
    count: usize,
    sample: Vec<ScholarshipRecord>,
}

#[derive(Serialize)]
struct SourceOut {
    name: String,
    mechanism: &'static str,
    endpoint: String,
}

#[derive(Serialize)]
struct ErrorResp {
    success: bool,
    error: String,
}

enum ApiError {
    Config(ConfigError),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Config(e @ ConfigError::UnknownSource(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Config(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "aggregation failed".to_string(),
            ),
        };
        (
            status,
            Json(ErrorResp {
                success: false,
                error,
            }),
        )
            .into_response()
    }
}

impl From<ConfigError> for ApiError {
    fn from(e: ConfigError) -> Self {
        ApiError::Config(e)
    }
}

/// Runs a pipeline invocation on its own task so a panic inside one run
/// becomes a 500 instead of a dropped connection.
async fn isolated<T, F, Fut>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(Arc<Aggregator>) -> Fut,
    Fut: Future<Output = Result<T, ConfigError>> + Send + 'static,
{
    let fut = f(state.aggregator.clone());
    match tokio::spawn(fut).await {
        Ok(res) => res.map_err(ApiError::from),
        Err(e) => {
            tracing::error!(target: "ingest", error = %e, "aggregation task failed");
            Err(ApiError::Internal)
        }
    }
}

/* ----------------------------
Handlers
---------------------------- */

async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceOut>> {
    let out = state
        .aggregator
        .registry()
        .sources()
        .iter()
        .map(|s| SourceOut {
            name: s.name.clone(),
            mechanism: s.mechanism.label(),
            endpoint: s.endpoint.clone(),
        })
        .collect();
    Json(out)
}

async fn aggregate(
    State(state): State<AppState>,
    Query(q): Query<AggregateQuery>,
) -> Result<Json<BatchResp>, ApiError> {
    let batch = isolated(&state, move |agg| async move {
        Ok(agg.run_all(q.category).await)
    })
    .await?;
    Ok(Json(batch.into()))
}

async fn scrape(
    State(state): State<AppState>,
    Json(body): Json<ScrapeReq>,
) -> Result<Json<BatchResp>, ApiError> {
    let batch = isolated(&state, move |agg| async move {
        agg.run_document(&body.url, body.selectors).await
    })
    .await?;
    Ok(Json(batch.into()))
}

async fn feed(
    State(state): State<AppState>,
    Json(body): Json<FeedReq>,
) -> Result<Json<BatchResp>, ApiError> {
    let batch = isolated(&state, move |agg| async move { agg.run_feed(&body.url).await }).await?;
    Ok(Json(batch.into()))
}

async fn api_source(
    State(state): State<AppState>,
    Json(body): Json<ApiReq>,
) -> Result<Json<BatchResp>, ApiError> {
    let batch = isolated(&state, move |agg| async move {
        agg.run_api(&body.url, body.headers, body.params).await
    })
    .await?;
    Ok(Json(batch.into()))
}

async fn run_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BatchResp>, ApiError> {
    let batch = isolated(&state, move |agg| async move { agg.run_named(&name).await }).await?;
    Ok(Json(batch.into()))
}

async fn test_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SampleResp>, ApiError> {
    let SourceSample { count, sample } =
        isolated(&state, move |agg| async move { agg.test_source(&name).await }).await?;
    Ok(Json(SampleResp {
        success: true,
        count,
        sample,
    }))
}
