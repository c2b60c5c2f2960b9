use crate::scheduler::SchedulerError;
use crate::types::ValidationError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
  pub code: &'static str,
  pub message: String,
}

/// Control-surface failure rendered as `{code, message}`.
#[derive(Debug)]
pub struct ApiError {
  pub status: StatusCode,
  pub code: &'static str,
  pub message: String,
}

impl ApiError {
  pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
    Self {
      status,
      code,
      message: message.into(),
    }
  }

  pub fn not_acceptable(message: impl Into<String>) -> Self {
    Self::new(StatusCode::NOT_ACCEPTABLE, "VALIDATION_ERROR", message)
  }

  pub fn service_unavailable(message: impl Into<String>) -> Self {
    Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = ApiErrorBody {
      code: self.code,
      message: self.message,
    };
    (self.status, Json(body)).into_response()
  }
}

impl From<ValidationError> for ApiError {
  fn from(err: ValidationError) -> Self {
    tracing::info!(error = %err, "rejected control request");
    ApiError::not_acceptable(err.to_string())
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ValidationError::Malformed(rejection.body_text()).into()
  }
}

impl From<SchedulerError> for ApiError {
  fn from(err: SchedulerError) -> Self {
    match err {
      SchedulerError::Stopped => ApiError::service_unavailable(err.to_string()),
      SchedulerError::Schedule(e) => ValidationError::Schedule(e).into(),
    }
  }
}

pub type ApiResult<T> = Result<T, ApiError>;
