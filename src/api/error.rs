use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::AnalysisError;
use crate::pipeline::PipelineError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable kind, e.g. `insufficient_data`.
    pub error: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    /// The request itself is malformed, before any analysis ran.
    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "invalid_request".into(),
                detail: detail.into(),
                stage: None,
            },
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let kind = err.kind();
        Self {
            status: StatusCode::from_u16(kind.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: ErrorBody {
                error: kind.as_str().into(),
                detail: err.to_string(),
                stage: None,
            },
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let stage = err.stage.as_str().to_string();
        let mut api = ApiError::from(err.source);
        api.body.stage = Some(stage);
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.body.error, detail = %self.body.detail, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
