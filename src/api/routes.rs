//! API route definitions.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::error::ApiError;
use super::state::AppState;
use crate::error::AnalysisError;
use crate::loader::{CsvLoader, SUPPORTED_DISEASES};
use crate::pipeline::{AnalysisReport, AnalysisRequest};
use crate::series::RawSample;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/diseases", get(diseases))
        .route("/regions", get(regions))
        .route("/analyze", post(analyze))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn diseases() -> Json<&'static [&'static str]> {
    Json(SUPPORTED_DISEASES)
}

#[derive(Debug, Deserialize)]
struct RegionsQuery {
    file: String,
}

async fn regions(
    State(state): State<AppState>,
    query: Result<Query<RegionsQuery>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    let loader = state.loader.clone();
    let table = run_loader(move || loader.load(&query.file)).await?;
    Ok(Json(table.regions()))
}

/// Either `raw_series` or `csv_filename` must be present; an inline series
/// wins when both are.
#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(alias = "country")]
    region: String,
    disease: String,
    #[serde(default)]
    raw_series: Option<Vec<RawSample>>,
    #[serde(default)]
    csv_filename: Option<String>,
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::invalid_request(e.body_text()))?;
    info!(region = %req.region, disease = %req.disease, "analysis requested");

    let raw_series = match (req.raw_series, req.csv_filename) {
        (Some(series), _) => series,
        (None, Some(file)) => {
            let loader: CsvLoader = state.loader.clone();
            let (region, disease) = (req.region.clone(), req.disease.clone());
            run_loader(move || loader.load(&file)?.series_for(&region, Some(&disease))).await?
        }
        (None, None) => {
            return Err(ApiError::invalid_request(
                "request needs either `raw_series` or `csv_filename`",
            ))
        }
    };

    let report = state
        .pipeline
        .run(AnalysisRequest {
            region: req.region,
            disease: req.disease,
            raw_series,
        })
        .await?;
    Ok(Json(report))
}

/// File reads go to the blocking pool.
async fn run_loader<T, F>(load: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
{
    let loaded = tokio::task::spawn_blocking(load)
        .await
        .map_err(|e| AnalysisError::Internal(format!("loader task failed: {e}")))??;
    Ok(loaded)
}
