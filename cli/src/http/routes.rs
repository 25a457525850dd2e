use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use crewline_core::api::TriggerRequest;
use uuid::Uuid;

use crate::http::{models::*, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/crews/:crew_id/executions", post(trigger_handler))
        .route("/api/v1/executions/:id", get(get_execution_handler))
        .route("/api/v1/executions/:id/cancel", post(cancel_handler))
        .route("/api/v1/executions/:id/retry", post(retry_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .with_state(state)
}

fn count(state: &AppState, endpoint: &str) {
    state.stats_mut().increment_request(endpoint);
}

fn fail(state: &AppState, err: impl Into<HttpServerError>) -> HttpServerError {
    state.stats_mut().increment_error();
    err.into()
}

/// POST /api/v1/crews/:crew_id/executions
async fn trigger_handler(
    State(state): State<AppState>,
    Path(crew_id): Path<String>,
    body: Option<Json<TriggerExecutionRequest>>,
) -> Result<(StatusCode, Json<ExecutionIdResponse>), HttpServerError> {
    count(&state, "trigger");
    let req = body.map(|Json(b)| b).unwrap_or_default();
    if crew_id.trim().is_empty() {
        return Err(fail(
            &state,
            HttpServerError::InvalidRequest("crew_id must not be empty".into()),
        ));
    }

    let request = TriggerRequest {
        crew_id,
        input_variables: req.input_variables,
        mode: req.mode,
        triggered_by: req.triggered_by.unwrap_or_else(|| "api".to_string()),
    };
    let execution_id = state
        .engine
        .trigger(request)
        .await
        .map_err(|e| fail(&state, e))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ExecutionIdResponse {
            success: true,
            execution_id,
        }),
    ))
}

/// GET /api/v1/executions/:id
async fn get_execution_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionResponse>, HttpServerError> {
    count(&state, "poll");
    let snapshot = state.engine.poll(id).await.map_err(|e| fail(&state, e))?;
    Ok(Json(ExecutionResponse {
        success: true,
        snapshot,
    }))
}

/// POST /api/v1/executions/:id/cancel
async fn cancel_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, HttpServerError> {
    count(&state, "cancel");
    let exec = state.engine.cancel(id).await.map_err(|e| fail(&state, e))?;
    Ok(Json(CancelResponse {
        success: true,
        execution_id: exec.id,
        status: exec.status,
    }))
}

/// POST /api/v1/executions/:id/retry
async fn retry_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ExecutionIdResponse>), HttpServerError> {
    count(&state, "retry");
    let execution_id = state
        .engine
        .retry(id, "api")
        .await
        .map_err(|e| fail(&state, e))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ExecutionIdResponse {
            success: true,
            execution_id,
        }),
    ))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats();
    Json(HealthResponse {
        status: "healthy".into(),
        session_id: state.session_id.clone(),
        uptime_seconds: stats.uptime_seconds(),
        requests_handled: stats.requests_total,
        timestamp: Local::now().to_rfc3339(),
    })
}

async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let _ = state.shutdown_tx.send(());
    Json(serde_json::json!({
        "success": true,
        "message": "Shutdown signal sent"
    }))
}
