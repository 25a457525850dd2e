use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crewline_core::api::{EngineError, ErrorKind, ExecutionStatus, ProgressSnapshot, RunMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============= Trigger / Retry =============

#[derive(Debug, Default, Deserialize)]
pub struct TriggerExecutionRequest {
    #[serde(default)]
    pub input_variables: BTreeMap<String, String>,
    #[serde(default)]
    pub mode: Option<RunMode>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionIdResponse {
    pub success: bool,
    pub execution_id: Uuid,
}

// ============= Poll =============

#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
}

// ============= Cancel =============

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
}

// ============= Health =============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_id: String,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
    pub timestamp: String,
}

// ============= Errors =============

#[derive(Debug)]
pub enum HttpServerError {
    Engine(EngineError),
    InvalidRequest(String),
}

impl From<EngineError> for HttpServerError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Configuration => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::TaskExecution | ErrorKind::Cancelled | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Self::Engine(err) => {
                let kind = err.kind();
                (status_for_kind(kind), kind.as_str(), err.to_string())
            }
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewline_core::api::StoreError;

    #[test]
    fn test_trigger_request_defaults() {
        let req: TriggerExecutionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.input_variables.is_empty());
        assert_eq!(req.mode, None);

        let req: TriggerExecutionRequest =
            serde_json::from_str(r#"{"input_variables":{"topic":"rust"},"mode":"real"}"#).unwrap();
        assert_eq!(req.input_variables["topic"], "rust");
        assert_eq!(req.mode, Some(RunMode::Real));
    }

    #[test]
    fn test_status_for_kind() {
        assert_eq!(
            status_for_kind(ErrorKind::Configuration),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for_kind(ErrorKind::InvalidState), StatusCode::CONFLICT);
        assert_eq!(status_for_kind(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for_kind(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_status() {
        let err = HttpServerError::from(EngineError::Store(StoreError::ExecutionNotFound(
            Uuid::new_v4(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
