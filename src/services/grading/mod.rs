//! Pluggable AI grading backends.
//!
//! A backend implements [`GradingBackend`]; the shared validation and failure
//! handling lives in [`template::GradingTemplate`], which each backend calls
//! explicitly from its `grade` implementation with its own [`template::CorrectionWire`].

pub(crate) mod factory;
pub(crate) mod gemini;
pub(crate) mod normalize;
pub(crate) mod template;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::types::QuestionType;

pub(crate) use factory::{BackendConfig, GradingBackendFactory, SupportedModel};

#[derive(Debug, Clone)]
pub(crate) struct GradingRequest {
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) student_answer: String,
    pub(crate) reference_answer: String,
    pub(crate) context: Option<String>,
}

/// Backend verdict on the backend-native 0–10 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradingOutcome {
    pub(crate) is_correct: bool,
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackendMetadata {
    pub(crate) name: &'static str,
    pub(crate) provider: &'static str,
    pub(crate) model: String,
    pub(crate) supports_open_questions: bool,
    pub(crate) supports_closed_questions: bool,
}

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("invalid grading request: {0}")]
    Validation(String),
    #[error("unsupported model '{0}'")]
    UnsupportedModel(String),
    #[error("failed to initialise grading backend: {0}")]
    Client(String),
}

#[async_trait]
pub(crate) trait GradingBackend: Send + Sync {
    fn describe(&self) -> BackendMetadata;

    /// Grades one answer. Only request validation fails; provider trouble
    /// comes back as a degraded outcome.
    async fn grade(&self, request: GradingRequest) -> Result<GradingOutcome, GradingError>;

    /// Whether the credentials the backend needs are present. No network I/O.
    fn is_ready(&self) -> bool;
}

pub(crate) const MAX_SCORE: f64 = 10.0;

impl GradingOutcome {
    /// Clamps score into `[0, 10]` and confidence into `[0, 1]`; non-finite values become 0.
    pub(crate) fn normalized(mut self) -> Self {
        self.score = clamp_finite(self.score, 0.0, MAX_SCORE);
        self.confidence = clamp_finite(self.confidence, 0.0, 1.0);
        self
    }

    /// Score rescaled to the submission's percentage scale.
    pub(crate) fn percentage(&self) -> f64 {
        let percentage = clamp_finite(self.score, 0.0, MAX_SCORE) * 100.0 / MAX_SCORE;
        (percentage * 10.0).round() / 10.0
    }
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(score: f64, confidence: f64) -> GradingOutcome {
        GradingOutcome { is_correct: true, score, feedback: String::new(), confidence }
    }

    #[test]
    fn normalized_clamps_out_of_range_values() {
        let high = outcome(14.0, 1.7).normalized();
        assert_eq!(high.score, 10.0);
        assert_eq!(high.confidence, 1.0);

        let low = outcome(-3.0, -0.2).normalized();
        assert_eq!(low.score, 0.0);
        assert_eq!(low.confidence, 0.0);

        let nan = outcome(f64::NAN, f64::INFINITY).normalized();
        assert_eq!(nan.score, 0.0);
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn percentage_rescales_ten_point_scores() {
        assert_eq!(outcome(7.0, 0.9).percentage(), 70.0);
        assert_eq!(outcome(10.0, 0.9).percentage(), 100.0);
        assert_eq!(outcome(0.0, 0.9).percentage(), 0.0);
        assert_eq!(outcome(6.66, 0.9).percentage(), 66.6);
    }
}
