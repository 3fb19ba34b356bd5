use std::time::Instant;

use serde::Serialize;
use validator::Validate;

use super::CorrectionError;
use crate::core::config::AiSettings;
use crate::db::types::QuestionType;
use crate::db::Database;
use crate::repositories;
use crate::repositories::submissions::GradeWrite;
use crate::services::grading::{
    BackendConfig, GradingBackendFactory, GradingRequest, SupportedModel,
};
use crate::services::queue::GradingJobPayload;
use crate::tasks::pacing::PacingGate;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradingWorkerResult {
    pub(crate) submission_id: String,
    pub(crate) question_id: String,
    /// Percentage in `[0, 100]`, as written to the submission.
    pub(crate) score: f64,
    pub(crate) is_correct: bool,
    pub(crate) feedback: String,
    pub(crate) confidence: f64,
}

/// Consumes one delivered correction job and writes its grade back.
#[derive(Clone)]
pub(crate) struct GradingWorker {
    db: Database,
    ai: AiSettings,
    pacing: PacingGate,
}

impl GradingWorker {
    pub(crate) fn new(db: Database, ai: AiSettings, pacing: PacingGate) -> Self {
        Self { db, ai, pacing }
    }

    pub(crate) fn pacing(&self) -> &PacingGate {
        &self.pacing
    }

    pub(crate) async fn handle_job(
        &self,
        payload: GradingJobPayload,
    ) -> Result<GradingWorkerResult, CorrectionError> {
        let payload = payload.trimmed();
        payload.validate().map_err(|err| CorrectionError::Validation(err.to_string()))?;

        let model = SupportedModel::parse(&payload.model)
            .ok_or_else(|| CorrectionError::UnsupportedModel(payload.model.clone()))?;

        let submission = repositories::submissions::find_by_id(&self.db, &payload.submission_id)
            .await
            .ok_or_else(|| CorrectionError::SubmissionNotFound(payload.submission_id.clone()))?;
        if submission.answer_for(&payload.question_id).is_none() {
            return Err(CorrectionError::AnswerNotFound {
                submission_id: submission.id,
                question_id: payload.question_id,
            });
        }

        let config = BackendConfig::from_settings(&self.ai, model.id());
        let backend = GradingBackendFactory::create(&config)?;
        if !backend.is_ready() {
            return Err(CorrectionError::BackendNotConfigured(model.id().to_string()));
        }

        let question = repositories::questions::find_by_id(&self.db, &payload.question_id).await;
        let question_type = payload
            .question_type
            .or_else(|| question.as_ref().map(|question| question.question_type()))
            .unwrap_or(QuestionType::Open);
        let context = question
            .map(|question| question.topic)
            .filter(|topic| !topic.trim().is_empty())
            .map(|topic| format!("Topic: {topic}"));

        let request = GradingRequest {
            question_id: payload.question_id.clone(),
            question_text: payload.question_text.clone(),
            question_type,
            student_answer: payload.student_answer.clone(),
            reference_answer: payload.correct_answer.clone(),
            context,
        };

        let permit = self
            .pacing
            .acquire()
            .await
            .map_err(|err| CorrectionError::Internal(format!("pacing gate closed: {err}")))?;

        let started = Instant::now();
        let outcome = match backend.grade(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                metrics::counter!("grading_jobs_total", "status" => "rejected").increment(1);
                return Err(err.into());
            }
        };
        metrics::histogram!("grading_duration_seconds").record(started.elapsed().as_secs_f64());

        let score = outcome.percentage();
        match repositories::submissions::set_answer_grade(
            &self.db,
            &payload.submission_id,
            &payload.question_id,
            score,
        )
        .await?
        {
            GradeWrite::Written => {}
            GradeWrite::SubmissionMissing => {
                return Err(CorrectionError::SubmissionNotFound(payload.submission_id));
            }
            GradeWrite::AnswerMissing => {
                return Err(CorrectionError::AnswerNotFound {
                    submission_id: payload.submission_id,
                    question_id: payload.question_id,
                });
            }
        }

        metrics::counter!("grading_jobs_total", "status" => "graded").increment(1);
        tracing::info!(
            submission_id = %payload.submission_id,
            question_id = %payload.question_id,
            model = model.id(),
            score,
            is_correct = outcome.is_correct,
            confidence = outcome.confidence,
            "Answer graded"
        );

        permit.release_after_interval().await;

        Ok(GradingWorkerResult {
            submission_id: payload.submission_id,
            question_id: payload.question_id,
            score,
            is_correct: outcome.is_correct,
            feedback: outcome.feedback,
            confidence: outcome.confidence,
        })
    }
}
