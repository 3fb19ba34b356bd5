use std::collections::HashMap;

use serde::Serialize;

use super::CorrectionError;
use crate::db::models::{Exam, Question, QuestionKind, StudentSubmission};
use crate::db::types::QuestionType;
use crate::db::Database;
use crate::repositories;
use crate::services::grading::GradingBackendFactory;
use crate::services::queue::{CorrectionJob, QueuePublisher};

/// Processing time plus the worker's pacing delay, per queued job.
pub(crate) const SECONDS_PER_JOB: u64 = 130;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerResult {
    pub(crate) message: String,
    pub(crate) estimated_time: String,
    pub(crate) total_student_exams: usize,
    pub(crate) total_open_questions: usize,
    pub(crate) queued_messages: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) errors: Vec<String>,
}

/// Fans a class's answered open questions out into queued correction jobs.
#[derive(Clone)]
pub(crate) struct CorrectionOrchestrator {
    db: Database,
    publisher: QueuePublisher,
}

impl CorrectionOrchestrator {
    pub(crate) fn new(db: Database, publisher: QueuePublisher) -> Self {
        Self { db, publisher }
    }

    pub(crate) async fn trigger_correction(
        &self,
        class_id: &str,
        model_id: &str,
    ) -> Result<TriggerResult, CorrectionError> {
        let class_id = class_id.trim();
        let model_id = model_id.trim();

        let missing: Vec<&str> = [("classId", class_id), ("model", model_id)]
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| field)
            .collect();
        if !missing.is_empty() {
            return Err(CorrectionError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        if !GradingBackendFactory::is_supported(model_id) {
            return Err(CorrectionError::UnsupportedModel(model_id.to_string()));
        }

        let submissions = repositories::submissions::list_by_class(&self.db, class_id).await;
        if submissions.is_empty() {
            return Err(CorrectionError::NoSubmissionsFound(class_id.to_string()));
        }

        if let Some(setting) = self.publisher.missing_setting() {
            return Err(CorrectionError::QueueNotConfigured(setting));
        }

        let jobs = self.build_jobs(class_id, model_id, &submissions).await;
        if jobs.is_empty() {
            return Err(CorrectionError::NoOpenQuestions(class_id.to_string()));
        }

        let total_jobs = jobs.len();
        let estimated_time = estimate_completion(total_jobs);
        tracing::info!(
            class_id,
            model = model_id,
            submissions = submissions.len(),
            jobs = total_jobs,
            transport = self.publisher.transport_name(),
            "Publishing correction batch"
        );

        let message_ids = self.publisher.publish_batch(&jobs).await.map_err(|err| {
            metrics::counter!("correction_triggers_total", "status" => "failed").increment(1);
            tracing::error!(class_id, error = %err, "Correction batch could not be published");
            CorrectionError::from(err)
        })?;

        let queued_messages = message_ids.len();
        let mut errors = Vec::new();
        if queued_messages < total_jobs {
            let failed = total_jobs - queued_messages;
            errors.push(format!("{failed} of {total_jobs} correction jobs failed to enqueue"));
            tracing::warn!(class_id, failed, total_jobs, "Correction batch partially queued");
            metrics::counter!("correction_triggers_total", "status" => "degraded").increment(1);
        } else {
            metrics::counter!("correction_triggers_total", "status" => "ok").increment(1);
        }

        Ok(TriggerResult {
            message: format!(
                "Correction started for {queued_messages} open answers from {} submissions",
                submissions.len()
            ),
            estimated_time,
            total_student_exams: submissions.len(),
            total_open_questions: total_jobs,
            queued_messages,
            errors,
        })
    }

    /// One job per (submission, answered open question), in registry then exam order.
    pub(crate) async fn build_jobs(
        &self,
        class_id: &str,
        model_id: &str,
        submissions: &[StudentSubmission],
    ) -> Vec<CorrectionJob> {
        let exams: HashMap<String, Exam> = repositories::exams::list_by_class(&self.db, class_id)
            .await
            .into_iter()
            .map(|exam| (exam.id.clone(), exam))
            .collect();

        let question_ids: Vec<String> =
            exams.values().flat_map(|exam| exam.question_ids.iter().cloned()).collect();
        let bank = repositories::questions::find_many(&self.db, &question_ids).await;

        let mut jobs = Vec::new();
        for submission in submissions {
            let Some(exam) = exams.get(&submission.exam_id) else {
                tracing::warn!(
                    submission_id = %submission.id,
                    exam_id = %submission.exam_id,
                    "Submission references an unknown exam; skipping"
                );
                continue;
            };

            for question in open_questions(exam, &bank) {
                let Some(answer) = submission.answer_for(&question.id) else {
                    continue;
                };
                if answer.answer.trim().is_empty() {
                    continue;
                }

                jobs.push(CorrectionJob {
                    submission_id: submission.id.clone(),
                    exam_id: exam.id.clone(),
                    class_id: class_id.to_string(),
                    question_id: question.id.clone(),
                    question_text: question.statement.clone(),
                    student_answer: answer.answer.clone(),
                    correct_answer: question.reference_answer(),
                    model: model_id.to_string(),
                    question_type: QuestionType::Open,
                });
            }
        }

        jobs
    }
}

fn open_questions<'a>(
    exam: &'a Exam,
    bank: &'a HashMap<String, Question>,
) -> impl Iterator<Item = &'a Question> + 'a {
    exam.question_ids
        .iter()
        .filter_map(|id| bank.get(id))
        .filter(|question| matches!(question.kind, QuestionKind::Open { .. }))
}

pub(crate) fn estimate_completion(total_jobs: usize) -> String {
    let seconds = total_jobs as u64 * SECONDS_PER_JOB;
    match seconds.div_ceil(60) {
        0 => "less than a minute".to_string(),
        1 => "1 minute".to_string(),
        minutes => format!("{minutes} minutes"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{self, FakeTransport, CLASS_ID};

    const MODEL: &str = "gemini-2.5-flash";

    fn orchestrator(db: Database, transport: Arc<FakeTransport>) -> CorrectionOrchestrator {
        CorrectionOrchestrator::new(db, QueuePublisher::new(transport))
    }

    #[tokio::test]
    async fn class_with_two_answered_open_questions_queues_two_jobs() {
        let transport = Arc::new(FakeTransport::default());
        let result = orchestrator(test_support::class_fixture(), transport.clone())
            .trigger_correction(CLASS_ID, MODEL)
            .await
            .expect("triggered");

        assert_eq!(result.total_student_exams, 1);
        assert_eq!(result.total_open_questions, 2);
        assert_eq!(result.queued_messages, 2);
        assert!(result.errors.is_empty());
        assert!(result.estimated_time.contains("minute"));

        let published = transport.published();
        assert_eq!(published.len(), 2);
        let first = published.iter().find(|job| job.question_id == "q-open-1").expect("job");
        assert_eq!(first.student_answer, "Ownership moves to the callee.");
        assert_eq!(first.model, MODEL);
        assert_eq!(first.question_type, QuestionType::Open);
        assert!(!first.correct_answer.is_empty());
    }

    #[tokio::test]
    async fn unsupported_model_never_reaches_the_publisher() {
        let transport = Arc::new(FakeTransport::default());
        let err = orchestrator(test_support::class_fixture(), transport.clone())
            .trigger_correction(CLASS_ID, "gpt-4o")
            .await
            .unwrap_err();

        assert!(matches!(&err, CorrectionError::UnsupportedModel(model) if model == "gpt-4o"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn preconditions_fail_in_order() {
        let transport = Arc::new(FakeTransport::missing("QUEUE_TOKEN"));
        let orchestrator = orchestrator(test_support::class_fixture(), transport.clone());

        assert!(matches!(
            orchestrator.trigger_correction(" ", "").await,
            Err(CorrectionError::Validation(message)) if message.contains("classId") && message.contains("model")
        ));
        assert!(matches!(
            orchestrator.trigger_correction("EMPTY-CLASS", MODEL).await,
            Err(CorrectionError::NoSubmissionsFound(_))
        ));
        assert!(matches!(
            orchestrator.trigger_correction(CLASS_ID, MODEL).await,
            Err(CorrectionError::QueueNotConfigured("QUEUE_TOKEN"))
        ));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn unanswered_open_questions_yield_no_jobs() {
        let db = test_support::class_fixture();
        for submission in db.write().await.submissions.iter_mut() {
            for answer in submission.answers.iter_mut() {
                answer.answer = "   ".to_string();
            }
        }

        let err = orchestrator(db, Arc::new(FakeTransport::default()))
            .trigger_correction(CLASS_ID, MODEL)
            .await
            .unwrap_err();

        assert!(matches!(err, CorrectionError::NoOpenQuestions(_)));
    }

    #[tokio::test]
    async fn single_failed_enqueue_is_reported_not_raised() {
        let transport = Arc::new(FakeTransport::failing_questions(&["q-open-2"]));
        let result = orchestrator(test_support::class_fixture(), transport)
            .trigger_correction(CLASS_ID, MODEL)
            .await
            .expect("degraded but ok");

        assert_eq!(result.total_open_questions, 2);
        assert_eq!(result.queued_messages, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("1 of 2"));
    }

    #[tokio::test]
    async fn unavailable_transport_is_a_fatal_dependency_error() {
        let err = orchestrator(test_support::class_fixture(), Arc::new(FakeTransport::unavailable()))
            .trigger_correction(CLASS_ID, MODEL)
            .await
            .unwrap_err();

        assert!(matches!(err, CorrectionError::Publish(_)));
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn estimate_renders_minutes() {
        assert_eq!(estimate_completion(0), "less than a minute");
        assert_eq!(estimate_completion(1), "3 minutes");
        assert_eq!(estimate_completion(2), "5 minutes");
        assert_eq!(estimate_completion(6), "13 minutes");
    }
}
