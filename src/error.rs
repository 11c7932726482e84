//! Error taxonomy shared by every analysis stage.

use serde::Serialize;
use thiserror::Error;

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientData,
    SeriesTooLong,
    InvalidConfig,
    DataNotFound,
    ModelFitting,
    Internal,
    Timeout,
}

impl ErrorKind {
    /// HTTP status the API layer reports for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::InsufficientData | ErrorKind::SeriesTooLong | ErrorKind::InvalidConfig => {
                400
            }
            ErrorKind::DataNotFound => 404,
            ErrorKind::ModelFitting | ErrorKind::Internal => 500,
            ErrorKind::Timeout => 504,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InsufficientData => "insufficient_data",
            ErrorKind::SeriesTooLong => "series_too_long",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::DataNotFound => "data_not_found",
            ErrorKind::ModelFitting => "model_fitting",
            ErrorKind::Internal => "internal",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("insufficient data: need {required} daily points, have {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("series spans {actual} days, limit is {max_days}")]
    SeriesTooLong { max_days: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("data not found: {0}")]
    DataNotFound(String),

    #[error("{model} could not be fitted: {detail}")]
    ModelFitting { model: &'static str, detail: String },

    #[error("analysis timed out after {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn model_fitting(model: &'static str, detail: impl Into<String>) -> Self {
        AnalysisError::ModelFitting {
            model,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::InsufficientData { .. } => ErrorKind::InsufficientData,
            AnalysisError::SeriesTooLong { .. } => ErrorKind::SeriesTooLong,
            AnalysisError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            AnalysisError::DataNotFound(_) => ErrorKind::DataNotFound,
            AnalysisError::ModelFitting { .. } => ErrorKind::ModelFitting,
            AnalysisError::Timeout { .. } => ErrorKind::Timeout,
            AnalysisError::Internal(_) => ErrorKind::Internal,
        }
    }
}
