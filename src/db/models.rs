use serde::{Deserialize, Serialize};

use crate::db::types::QuestionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Student {
    pub(crate) id: String,
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) class_id: String,
    pub(crate) title: String,
    #[serde(default = "default_true")]
    pub(crate) is_valid: bool,
    #[serde(default)]
    pub(crate) open_questions: u32,
    #[serde(default)]
    pub(crate) closed_questions: u32,
    #[serde(default)]
    pub(crate) question_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Question {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) topic: String,
    pub(crate) statement: String,
    #[serde(flatten)]
    pub(crate) kind: QuestionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum QuestionKind {
    Open {
        #[serde(rename = "referenceAnswer")]
        reference_answer: String,
    },
    Closed {
        options: Vec<QuestionOption>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionOption {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StudentSubmission {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) exam_id: String,
    #[serde(default)]
    pub(crate) answers: Vec<SubmissionAnswer>,
    /// Closed-question component written by the deterministic corrector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) closed_grade: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubmissionAnswer {
    pub(crate) question_id: String,
    pub(crate) answer: String,
    /// Percentage in `[0, 100]`, absent until scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) grade: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Question {
    pub(crate) fn question_type(&self) -> QuestionType {
        match self.kind {
            QuestionKind::Open { .. } => QuestionType::Open,
            QuestionKind::Closed { .. } => QuestionType::Closed,
        }
    }

    /// Reference text handed to graders: the model answer, or the correct options joined.
    pub(crate) fn reference_answer(&self) -> String {
        match &self.kind {
            QuestionKind::Open { reference_answer } => reference_answer.clone(),
            QuestionKind::Closed { options } => options
                .iter()
                .filter(|option| option.is_correct)
                .map(|option| option.text.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl StudentSubmission {
    pub(crate) fn answer_for(&self, question_id: &str) -> Option<&SubmissionAnswer> {
        self.answers.iter().find(|answer| answer.question_id == question_id)
    }
}
