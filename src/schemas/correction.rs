use serde::{Deserialize, Serialize};

use crate::tasks::correction::GradingWorkerResult;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerCorrectionRequest {
    #[serde(default)]
    pub(crate) class_id: String,
    #[serde(default)]
    pub(crate) model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WebhookResponse {
    pub(crate) message: String,
    pub(crate) student_exam_id: String,
    pub(crate) question_id: String,
    pub(crate) score: f64,
    pub(crate) is_correct: bool,
    pub(crate) feedback: String,
    pub(crate) confidence: f64,
}

impl From<GradingWorkerResult> for WebhookResponse {
    fn from(result: GradingWorkerResult) -> Self {
        Self {
            message: "Answer graded".to_string(),
            student_exam_id: result.submission_id,
            question_id: result.question_id,
            score: result.score,
            is_correct: result.is_correct,
            feedback: result.feedback,
            confidence: result.confidence,
        }
    }
}
