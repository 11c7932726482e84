//! Anomaly detection: a univariate z-score test, an isolation-forest
//! ensemble over the rolling features, and the union of the two.

pub mod combine;
pub mod ensemble;
pub mod zscore;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::series::features::FeatureVector;

/// Which detector flagged a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DetectionMethod {
    #[serde(rename = "z-score")]
    ZScore,
    #[serde(rename = "isolation-forest")]
    IsolationForest,
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionMethod::ZScore => write!(f, "z-score"),
            DetectionMethod::IsolationForest => write!(f, "isolation-forest"),
        }
    }
}

/// A date flagged by at least one detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub date: NaiveDate,
    pub cases: f64,
    pub rolling_mean: f64,
    pub z_score: f64,
    pub anomaly_score: f64,
    pub detected_by: Vec<DetectionMethod>,
}

/// Ensemble output for a batch of feature rows, index-aligned with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleScores {
    /// Lower is more anomalous.
    pub scores: Vec<f64>,
    pub flags: Vec<bool>,
    pub threshold: f64,
}

impl EnsembleScores {
    pub fn flagged_count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }
}

/// Capability seam for the multivariate detector so the numerical routine
/// can be swapped without touching the pipeline.
pub trait AnomalyScorer: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fit on `rows` and score every row.
    fn fit_and_score(&self, rows: &[FeatureVector]) -> Result<EnsembleScores, AnalysisError>;
}
