use std::collections::{HashMap, HashSet};

use crate::db::models::StudentSubmission;
use crate::db::{Database, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GradeWrite {
    Written,
    SubmissionMissing,
    AnswerMissing,
}

#[derive(Debug, Clone)]
pub(crate) struct ClosedGradeUpdate {
    pub(crate) submission_id: String,
    pub(crate) question_grades: HashMap<String, f64>,
    pub(crate) final_grade: f64,
}

pub(crate) async fn find_by_id(db: &Database, id: &str) -> Option<StudentSubmission> {
    db.read().await.submissions.iter().find(|submission| submission.id == id).cloned()
}

pub(crate) async fn list_by_exam(db: &Database, exam_id: &str) -> Vec<StudentSubmission> {
    db.read()
        .await
        .submissions
        .iter()
        .filter(|submission| submission.exam_id == exam_id)
        .cloned()
        .collect()
}

/// Submissions whose exam belongs to `class_id`, in registry order.
pub(crate) async fn list_by_class(db: &Database, class_id: &str) -> Vec<StudentSubmission> {
    let snapshot = db.read().await;
    let exam_ids: HashSet<&str> = snapshot
        .exams
        .iter()
        .filter(|exam| exam.class_id == class_id)
        .map(|exam| exam.id.as_str())
        .collect();

    snapshot
        .submissions
        .iter()
        .filter(|submission| exam_ids.contains(submission.exam_id.as_str()))
        .cloned()
        .collect()
}

/// Overwrites the grade of one answer, leaving its text untouched.
pub(crate) async fn set_answer_grade(
    db: &Database,
    submission_id: &str,
    question_id: &str,
    grade: f64,
) -> Result<GradeWrite, StoreError> {
    {
        let mut snapshot = db.write().await;
        let Some(submission) =
            snapshot.submissions.iter_mut().find(|submission| submission.id == submission_id)
        else {
            return Ok(GradeWrite::SubmissionMissing);
        };

        let Some(answer) =
            submission.answers.iter_mut().find(|answer| answer.question_id == question_id)
        else {
            return Ok(GradeWrite::AnswerMissing);
        };

        answer.grade = Some(grade);
    }

    db.persist().await?;
    Ok(GradeWrite::Written)
}

/// Applies closed-question grades in one write; returns how many submissions were updated.
pub(crate) async fn store_closed_grades(
    db: &Database,
    updates: &[ClosedGradeUpdate],
) -> Result<usize, StoreError> {
    if updates.is_empty() {
        return Ok(0);
    }

    let mut updated = 0;
    {
        let mut snapshot = db.write().await;
        for update in updates {
            let Some(submission) = snapshot
                .submissions
                .iter_mut()
                .find(|submission| submission.id == update.submission_id)
            else {
                continue;
            };

            for answer in submission.answers.iter_mut() {
                if let Some(grade) = update.question_grades.get(&answer.question_id) {
                    answer.grade = Some(*grade);
                }
            }
            submission.closed_grade = Some(update.final_grade);
            updated += 1;
        }
    }

    db.persist().await?;
    Ok(updated)
}
