use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::db::types::QuestionType;

/// One (submission, question) unit of grading work, as published to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CorrectionJob {
    pub(crate) submission_id: String,
    pub(crate) exam_id: String,
    pub(crate) class_id: String,
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) student_answer: String,
    pub(crate) correct_answer: String,
    pub(crate) model: String,
    pub(crate) question_type: QuestionType,
}

/// What the webhook receives. Every field is optional on the wire so a
/// missing one surfaces as a validation error instead of a decode failure.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradingJobPayload {
    #[serde(default, alias = "studentExamId")]
    #[validate(length(min = 1, message = "submissionId is required"))]
    pub(crate) submission_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "model is required"))]
    pub(crate) model: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "questionId is required"))]
    pub(crate) question_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "questionText is required"))]
    pub(crate) question_text: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "studentAnswer is required"))]
    pub(crate) student_answer: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "correctAnswer is required"))]
    pub(crate) correct_answer: String,
    #[serde(default)]
    pub(crate) exam_id: Option<String>,
    #[serde(default)]
    pub(crate) class_id: Option<String>,
    #[serde(default)]
    pub(crate) question_type: Option<QuestionType>,
}

impl CorrectionJob {
    /// Stable id for transport-side deduplication of re-published jobs.
    pub(crate) fn deduplication_id(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.submission_id, &self.question_id, &self.model] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

impl GradingJobPayload {
    /// Trims the required fields so whitespace-only values fail validation.
    pub(crate) fn trimmed(mut self) -> Self {
        for field in [
            &mut self.submission_id,
            &mut self.model,
            &mut self.question_id,
            &mut self.question_text,
            &mut self.student_answer,
            &mut self.correct_answer,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        self
    }
}

impl From<CorrectionJob> for GradingJobPayload {
    fn from(job: CorrectionJob) -> Self {
        Self {
            submission_id: job.submission_id,
            model: job.model,
            question_id: job.question_id,
            question_text: job.question_text,
            student_answer: job.student_answer,
            correct_answer: job.correct_answer,
            exam_id: Some(job.exam_id),
            class_id: Some(job.class_id),
            question_type: Some(job.question_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> CorrectionJob {
        CorrectionJob {
            submission_id: "sub-1".to_string(),
            exam_id: "exam-1".to_string(),
            class_id: "CS101-2025-1".to_string(),
            question_id: "q-open-1".to_string(),
            question_text: "Explain moves".to_string(),
            student_answer: "Ownership transfers".to_string(),
            correct_answer: "The value is moved".to_string(),
            model: "gemini-2.5-flash".to_string(),
            question_type: QuestionType::Open,
        }
    }

    #[test]
    fn published_json_decodes_as_webhook_payload() {
        let wire = serde_json::to_value(job()).expect("serialize");
        assert_eq!(wire["submissionId"], "sub-1");
        assert_eq!(wire["questionType"], "open");

        let payload: GradingJobPayload = serde_json::from_value(wire).expect("payload");
        assert!(payload.validate().is_ok());
        assert_eq!(payload.question_type, Some(QuestionType::Open));
    }

    #[test]
    fn legacy_student_exam_id_is_accepted() {
        let payload: GradingJobPayload = serde_json::from_value(json!({
            "studentExamId": "sub-9",
            "model": "gemini-2.5-flash",
            "questionId": "q1",
            "questionText": "?",
            "studentAnswer": "a",
            "correctAnswer": "b"
        }))
        .expect("payload");

        assert_eq!(payload.submission_id, "sub-9");
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn missing_fields_fail_validation() {
        let payload: GradingJobPayload =
            serde_json::from_value(json!({"questionId": "q1"})).expect("payload");

        let errors = payload.validate().expect_err("invalid").to_string();
        assert!(errors.contains("submissionId is required"));
        assert!(errors.contains("studentAnswer is required"));
    }

    #[test]
    fn whitespace_only_fields_fail_after_trimming() {
        let payload: GradingJobPayload = serde_json::from_value(json!({
            "submissionId": " sub-1 ",
            "model": "gemini-2.5-flash",
            "questionId": "q1",
            "questionText": "  ",
            "studentAnswer": "\n\t ",
            "correctAnswer": " Ownership moves. "
        }))
        .expect("payload");

        let payload = payload.trimmed();
        assert_eq!(payload.submission_id, "sub-1");
        assert_eq!(payload.correct_answer, "Ownership moves.");

        let errors = payload.validate().expect_err("invalid").to_string();
        assert!(errors.contains("questionText is required"));
        assert!(errors.contains("studentAnswer is required"));
        assert!(!errors.contains("correctAnswer"));
    }

    #[test]
    fn deduplication_id_is_stable_per_target() {
        let first = job();
        let mut other_question = job();
        other_question.question_id = "q-open-2".to_string();

        assert_eq!(first.deduplication_id(), job().deduplication_id());
        assert_ne!(first.deduplication_id(), other_question.deduplication_id());
        assert_eq!(first.deduplication_id().len(), 64);
    }
}
