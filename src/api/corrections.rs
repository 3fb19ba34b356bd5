use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::correction::{TriggerCorrectionRequest, WebhookResponse};
use crate::services::queue::GradingJobPayload;
use crate::tasks::correction::TriggerResult;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/trigger", post(trigger_correction))
        .route("/webhook", post(grading_webhook))
}

async fn trigger_correction(
    State(state): State<AppState>,
    payload: Result<Json<TriggerCorrectionRequest>, JsonRejection>,
) -> Result<Json<TriggerResult>, ApiError> {
    let Json(payload) = payload?;
    let result = state.orchestrator().trigger_correction(&payload.class_id, &payload.model).await?;
    Ok(Json(result))
}

async fn grading_webhook(
    State(state): State<AppState>,
    payload: Result<Json<GradingJobPayload>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Json(payload) = payload?;
    let result = state.worker().handle_job(payload).await?;
    Ok(Json(result.into()))
}
