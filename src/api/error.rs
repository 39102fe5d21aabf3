use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::PipelineError;

/// API error types that can be returned from handlers.
///
/// Every failure maps to HTTP 400 with a `{"success": false, "error": ...}`
/// body; clients branch on `success`, not on status classes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::InvalidRequest(_) => tracing::debug!(error = %self, "client error"),
            ApiError::Prediction(_) => tracing::warn!(error = %self, "prediction error"),
        }

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match &error {
            PipelineError::InvalidInput(_) => ApiError::InvalidRequest(error.to_string()),
            _ => ApiError::Prediction(error.to_string()),
        }
    }
}

/// Request-body extractor whose rejection speaks the same
/// `{"success": false, "error": ...}` dialect as every other failure,
/// instead of axum's plain-text 422.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::InvalidRequest(rejection.body_text())),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<PipelineError>() {
            Ok(pipeline) => pipeline.into(),
            Err(other) => ApiError::Prediction(other.to_string()),
        }
    }
}
