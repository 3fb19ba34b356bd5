use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::db::models::{Question, QuestionKind, StudentSubmission};
use crate::db::{Database, StoreError};
use crate::repositories;
use crate::repositories::submissions::ClosedGradeUpdate;
use crate::services::grading::normalize::normalize_answer;

pub(crate) const UNKNOWN_STUDENT_NAME: &str = "Unknown student";

#[derive(Debug, Error)]
pub(crate) enum ClosedCorrectionError {
    #[error("exam {0} not found")]
    ExamNotFound(String),
    #[error("no submissions found for exam {0}")]
    NoSubmissions(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClosedGradeResult {
    pub(crate) student_id: String,
    pub(crate) exam_id: String,
    pub(crate) final_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NamedClosedGradeResult {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) exam_id: String,
    pub(crate) final_grade: f64,
}

/// Deterministic scoring of multiple-choice answers.
#[derive(Clone)]
pub(crate) struct ClosedQuestionCorrector {
    db: Database,
}

impl ClosedQuestionCorrector {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }

    /// Grades every submission of `exam_id`, persists the grades, then reports them.
    pub(crate) async fn correct_exam(
        &self,
        exam_id: &str,
    ) -> Result<Vec<ClosedGradeResult>, ClosedCorrectionError> {
        let exam = repositories::exams::find_by_id(&self.db, exam_id)
            .await
            .ok_or_else(|| ClosedCorrectionError::ExamNotFound(exam_id.to_string()))?;

        let submissions = repositories::submissions::list_by_exam(&self.db, &exam.id).await;
        if submissions.is_empty() {
            return Err(ClosedCorrectionError::NoSubmissions(exam.id));
        }

        let bank = repositories::questions::find_many(&self.db, &exam.question_ids).await;
        let mut seen = HashSet::new();
        let closed: Vec<&Question> = exam
            .question_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| bank.get(id))
            .filter(|question| matches!(question.kind, QuestionKind::Closed { .. }))
            .collect();

        let mut updates = Vec::with_capacity(submissions.len());
        let mut results = Vec::with_capacity(submissions.len());
        for submission in &submissions {
            let update = grade_submission(&closed, submission);
            results.push(ClosedGradeResult {
                student_id: submission.student_id.clone(),
                exam_id: exam.id.clone(),
                final_grade: update.final_grade,
            });
            updates.push(update);
        }

        let stored = repositories::submissions::store_closed_grades(&self.db, &updates).await?;
        metrics::counter!("closed_corrections_total").increment(1);
        tracing::info!(
            exam_id = %exam.id,
            closed_questions = closed.len(),
            submissions = stored,
            "Closed-question correction finished"
        );

        Ok(results)
    }

    /// Attaches display names; unregistered students get a placeholder.
    pub(crate) async fn with_student_names(
        &self,
        results: Vec<ClosedGradeResult>,
    ) -> Vec<NamedClosedGradeResult> {
        let ids: Vec<String> = results.iter().map(|result| result.student_id.clone()).collect();
        let names = repositories::students::names_by_ids(&self.db, &ids).await;

        results
            .into_iter()
            .map(|result| NamedClosedGradeResult {
                student_name: names
                    .get(&result.student_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_STUDENT_NAME.to_string()),
                student_id: result.student_id,
                exam_id: result.exam_id,
                final_grade: result.final_grade,
            })
            .collect()
    }
}

fn grade_submission(closed: &[&Question], submission: &StudentSubmission) -> ClosedGradeUpdate {
    let question_grades: HashMap<String, f64> = closed
        .iter()
        .map(|question| {
            let answer = submission.answer_for(&question.id).map(|answer| answer.answer.as_str());
            (question.id.clone(), grade_question(question, answer.unwrap_or_default()))
        })
        .collect();

    let final_grade = if closed.is_empty() {
        0.0
    } else {
        round_one_decimal(question_grades.values().sum::<f64>() / closed.len() as f64)
    };

    ClosedGradeUpdate { submission_id: submission.id.clone(), question_grades, final_grade }
}

/// Percentage of the question's correct options the answer selected.
pub(crate) fn grade_question(question: &Question, answer: &str) -> f64 {
    let QuestionKind::Closed { options } = &question.kind else {
        return 0.0;
    };

    let correct: HashSet<&str> =
        options.iter().filter(|option| option.is_correct).map(|option| option.id.as_str()).collect();
    if correct.is_empty() {
        return 0.0;
    }

    let selected: HashSet<&str> = answer
        .split(',')
        .map(normalize_answer)
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            options
                .iter()
                .find(|option| {
                    normalize_answer(&option.id) == token || normalize_answer(&option.text) == token
                })
                .map(|option| option.id.as_str())
        })
        .collect();

    let hits = selected.intersection(&correct).count();
    (hits as f64 / correct.len() as f64 * 100.0).clamp(0.0, 100.0)
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
