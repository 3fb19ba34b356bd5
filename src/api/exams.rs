use axum::extract::{Path, State};
use axum::{routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::exam::ClosedCorrectionResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:exam_id/closed-correction", post(correct_closed_questions))
}

async fn correct_closed_questions(
    State(state): State<AppState>,
    Path(exam_id): Path<String>,
) -> Result<Json<ClosedCorrectionResponse>, ApiError> {
    let corrector = state.closed_corrector();
    let results = corrector.correct_exam(&exam_id).await?;
    let results = corrector.with_student_names(results).await;

    Ok(Json(ClosedCorrectionResponse { exam_id, results }))
}
