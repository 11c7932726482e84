//! End-to-end analysis of one (region, disease) case series.
//!
//! A run walks the stages in [`Stage`] order and either yields a complete
//! [`AnalysisReport`] or fails with the stage that broke; there is no partial
//! output. The ensemble and forecast fits are CPU-bound and run on the
//! blocking pool behind a shared semaphore.

mod stage;

pub use stage::{PipelineError, RunState, Stage};

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use self::stage::StageTracker;
use crate::analysis::{
    AnomalyStats, Explanation, ExplanationEngine, ForecastStats, SummaryStats, TrendBand,
};
use crate::config::AnalysisConfig;
use crate::detect::combine::{self, EnsembleFlag};
use crate::detect::ensemble::IsolationForest;
use crate::detect::zscore::ZScoreDetector;
use crate::detect::{AnomalyRecord, AnomalyScorer};
use crate::error::AnalysisError;
use crate::forecast::{ForecastPoint, SeasonalForecaster, SeriesForecaster};
use crate::series::features::{FeatureFrame, FeatureVector};
use crate::series::{self, RawSample};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub region: String,
    pub disease: String,
    pub raw_series: Vec<RawSample>,
}

/// One day of the cleaned series with its rolling statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CleanedPoint {
    pub date: NaiveDate,
    pub cases: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolling_std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub region: String,
    pub disease: String,
    pub cleaned_data: Vec<CleanedPoint>,
    pub anomalies: Vec<AnomalyRecord>,
    pub forecast: Vec<ForecastPoint>,
    pub summary_stats: SummaryStats,
    pub anomaly_stats: AnomalyStats,
    pub forecast_stats: ForecastStats,
    pub ai_explanation: Explanation,
}

/// Shared, immutable analysis pipeline. Cheap to call concurrently.
pub struct Pipeline {
    config: AnalysisConfig,
    scorer: Arc<dyn AnomalyScorer>,
    forecaster: Arc<dyn SeriesForecaster>,
    fit_permits: Arc<Semaphore>,
}

impl Pipeline {
    /// Validates `config` and wires the default models.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            scorer: Arc::new(IsolationForest::from_config(&config)),
            forecaster: Arc::new(SeasonalForecaster::from_config(&config)),
            fit_permits: Arc::new(Semaphore::new(config.max_concurrent_fits)),
            config,
        })
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn AnomalyScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_forecaster(mut self, forecaster: Arc<dyn SeriesForecaster>) -> Self {
        self.forecaster = forecaster;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "analysis",
            %run_id,
            region = %request.region,
            disease = %request.disease
        );

        async move {
            let tracker = StageTracker::default();
            let outcome = match self.config.timeout() {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.execute(&request, &tracker)).await {
                        Ok(result) => result,
                        Err(_) => Err(tracker.fail(AnalysisError::Timeout {
                            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        })),
                    }
                }
                None => self.execute(&request, &tracker).await,
            };

            match &outcome {
                Ok(report) => info!(
                    state = %RunState::Done,
                    days = report.cleaned_data.len(),
                    anomalies = report.anomalies.len(),
                    risk = %report.ai_explanation.risk_level,
                    "analysis finished"
                ),
                Err(e) => warn!(state = %e.state(), error = %e.source, "analysis failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        tracker: &StageTracker,
    ) -> Result<AnalysisReport, PipelineError> {
        let cfg = &self.config;

        tracker.enter(Stage::Normalizing);
        let series =
            series::normalize(&request.raw_series, cfg.min_data_points, cfg.max_series_days)
                .map_err(|e| tracker.fail(e))?;

        tracker.enter(Stage::FeatureComputing);
        let frame = FeatureFrame::compute(&series, cfg.rolling_window);

        tracker.enter(Stage::Detecting);
        let z_scores = ZScoreDetector::new(cfg.z_score_threshold).detect(&frame);
        let (indices, rows): (Vec<usize>, Vec<FeatureVector>) = frame.defined().unzip();
        let row_count = rows.len();
        let scorer = Arc::clone(&self.scorer);
        let scores = self
            .fit_blocking(tracker, move || scorer.fit_and_score(&rows))
            .await?;
        if scores.scores.len() != row_count || scores.flags.len() != row_count {
            return Err(tracker.fail(AnalysisError::Internal(format!(
                "{} returned {} scores for {} rows",
                self.scorer.name(),
                scores.scores.len(),
                row_count
            ))));
        }
        let mut ensemble = vec![None; frame.len()];
        for (k, &i) in indices.iter().enumerate() {
            ensemble[i] = Some(EnsembleFlag {
                score: scores.scores[k],
                flagged: scores.flags[k],
            });
        }

        tracker.enter(Stage::Combining);
        let combined = combine::combine(&frame, &z_scores, &ensemble);

        tracker.enter(Stage::Forecasting);
        let horizon = cfg.forecast_horizon;
        let forecaster = Arc::clone(&self.forecaster);
        let history = series.clone();
        let forecast = self
            .fit_blocking(tracker, move || forecaster.fit_and_forecast(&history, horizon))
            .await?;
        if forecast.len() != horizon {
            return Err(tracker.fail(AnalysisError::Internal(format!(
                "{} returned {} points for a {horizon}-day horizon",
                self.forecaster.name(),
                forecast.len()
            ))));
        }

        tracker.enter(Stage::Aggregating);
        let band = TrendBand::from_config(cfg);
        let summary_stats = SummaryStats::compute(&series, &band);
        let anomaly_stats = AnomalyStats::compute(&combined);
        let forecast_stats = ForecastStats::compute(&forecast, &band);

        tracker.enter(Stage::Explaining);
        let ai_explanation = ExplanationEngine::from_config(cfg).explain(
            &request.region,
            &request.disease,
            &summary_stats,
            &anomaly_stats,
            &forecast_stats,
        );

        let cleaned_data = frame
            .rows()
            .iter()
            .map(|row| CleanedPoint {
                date: row.date,
                cases: row.cases,
                rolling_mean: row.rolling_mean,
                rolling_std: row.rolling_std,
            })
            .collect();

        Ok(AnalysisReport {
            region: request.region.clone(),
            disease: request.disease.clone(),
            cleaned_data,
            anomalies: combined.records,
            forecast,
            summary_stats,
            anomaly_stats,
            forecast_stats,
            ai_explanation,
        })
    }

    /// Run a model fit on the blocking pool. The permit moves into the task,
    /// so a fit abandoned by a timeout still counts against the limit until
    /// it actually finishes.
    async fn fit_blocking<T, F>(&self, tracker: &StageTracker, fit: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    {
        let permit = Arc::clone(&self.fit_permits)
            .acquire_owned()
            .await
            .map_err(|e| tracker.fail(AnalysisError::Internal(e.to_string())))?;
        debug!(available = self.fit_permits.available_permits(), "fit permit acquired");

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            fit()
        })
        .await
        .map_err(|e| tracker.fail(AnalysisError::Internal(format!("fit task failed: {e}"))))?
        .map_err(|e| tracker.fail(e))
    }
}
