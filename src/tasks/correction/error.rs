use thiserror::Error;

use crate::db::StoreError;
use crate::services::grading::GradingError;
use crate::services::queue::TransportError;

/// Failures of the trigger and the webhook consumer, grouped the way callers react to them.
#[derive(Debug, Error)]
pub(crate) enum CorrectionError {
    #[error("{0}")]
    Validation(String),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("no submissions found for class {0}")]
    NoSubmissionsFound(String),
    #[error("no answered open questions to correct for class {0}")]
    NoOpenQuestions(String),
    #[error("submission {0} not found")]
    SubmissionNotFound(String),
    #[error("submission {submission_id} has no answer for question {question_id}")]
    AnswerNotFound { submission_id: String, question_id: String },
    #[error("queue is not configured: missing {0}")]
    QueueNotConfigured(&'static str),
    #[error("grading backend {0} is not configured")]
    BackendNotConfigured(String),
    #[error("failed to publish correction jobs: {0}")]
    Publish(TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Validation,
    NotFound,
    Configuration,
    Dependency,
}

impl CorrectionError {
    pub(crate) fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::UnsupportedModel(_) => ErrorKind::Validation,
            Self::NoSubmissionsFound(_)
            | Self::NoOpenQuestions(_)
            | Self::SubmissionNotFound(_)
            | Self::AnswerNotFound { .. } => ErrorKind::NotFound,
            Self::QueueNotConfigured(_) | Self::BackendNotConfigured(_) => {
                ErrorKind::Configuration
            }
            Self::Publish(_) | Self::Store(_) | Self::Internal(_) => ErrorKind::Dependency,
        }
    }
}

impl From<TransportError> for CorrectionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConfigured(setting) => Self::QueueNotConfigured(setting),
            other => Self::Publish(other),
        }
    }
}

impl From<GradingError> for CorrectionError {
    fn from(err: GradingError) -> Self {
        match err {
            GradingError::Validation(message) => Self::Validation(message),
            GradingError::UnsupportedModel(model) => Self::UnsupportedModel(model),
            GradingError::Client(message) => Self::BackendNotConfigured(message),
        }
    }
}
