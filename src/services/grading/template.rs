use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{GradingError, GradingOutcome, GradingRequest};

pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 2;

const QUOTA_FEEDBACK: &str =
    "The AI grading quota or rate limit was exceeded; this answer must be graded again later.";
const AUTH_FEEDBACK: &str =
    "The AI grading provider rejected the credentials; the backend API key must be checked.";
const MALFORMED_FEEDBACK: &str =
    "The AI grading provider rejected the request as malformed; the answer was not graded.";
const RETRY_FEEDBACK: &str =
    "The answer could not be graded automatically; please retry the correction.";

/// Failure of the provider-specific wire step.
#[derive(Debug, Error)]
pub(crate) enum ProviderError {
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider request timed out")]
    Timeout,
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider reply could not be parsed: {0}")]
    Parse(String),
}

impl ProviderError {
    pub(crate) fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        match err.status() {
            Some(status) => Self::Status { status: status.as_u16(), body: err.to_string() },
            None => Self::Request(err.to_string()),
        }
    }
}

/// Backend-specific half of grading: build and send the call, then read the reply.
#[async_trait]
pub(crate) trait CorrectionWire: Send + Sync {
    async fn execute_correction(&self, request: &GradingRequest) -> Result<String, ProviderError>;

    fn parse_response(
        &self,
        raw: &str,
        request: &GradingRequest,
    ) -> Result<GradingOutcome, ProviderError>;
}

/// Invariant half of grading shared by every backend.
#[derive(Debug, Clone)]
pub(crate) struct GradingTemplate {
    backend: &'static str,
}

impl GradingTemplate {
    pub(crate) fn new(backend: &'static str) -> Self {
        Self { backend }
    }

    pub(crate) fn validate(request: &GradingRequest) -> Result<(), GradingError> {
        let mut missing = Vec::new();
        if request.question_text.trim().is_empty() {
            missing.push("question text");
        }
        if request.student_answer.trim().is_empty() {
            missing.push("student answer");
        }
        if request.reference_answer.trim().is_empty() {
            missing.push("reference answer");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GradingError::Validation(format!("missing {}", missing.join(", "))))
        }
    }

    /// Validates, runs the wire call and parses the reply. Validation errors
    /// propagate before any network call; everything else degrades.
    pub(crate) async fn grade<W>(
        &self,
        wire: &W,
        request: &GradingRequest,
    ) -> Result<GradingOutcome, GradingError>
    where
        W: CorrectionWire + ?Sized,
    {
        Self::validate(request)?;

        let raw = match wire.execute_correction(request).await {
            Ok(raw) => raw,
            Err(err) => return Ok(self.degraded(request, &err)),
        };

        match wire.parse_response(&raw, request) {
            Ok(outcome) => Ok(outcome.normalized()),
            Err(err) => Ok(self.degraded(request, &err)),
        }
    }

    fn degraded(&self, request: &GradingRequest, err: &ProviderError) -> GradingOutcome {
        tracing::warn!(
            backend = self.backend,
            question_id = %request.question_id,
            status = ?err.status(),
            error = %err,
            "Grading backend call failed; returning degraded outcome"
        );
        metrics::counter!("grading_provider_errors_total", "backend" => self.backend)
            .increment(1);

        GradingOutcome {
            is_correct: false,
            score: 0.0,
            feedback: classify_failure(err).to_string(),
            confidence: 0.0,
        }
    }
}

pub(crate) fn classify_failure(err: &ProviderError) -> &'static str {
    match err.status() {
        Some(429) => QUOTA_FEEDBACK,
        Some(401) => AUTH_FEEDBACK,
        Some(400) => MALFORMED_FEEDBACK,
        _ => RETRY_FEEDBACK,
    }
}
