use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::normalize::answers_match;
use super::template::{CorrectionWire, GradingTemplate, ProviderError};
use super::{
    BackendConfig, BackendMetadata, GradingBackend, GradingError, GradingOutcome, GradingRequest,
    MAX_SCORE,
};
use crate::db::types::QuestionType;

const BACKEND_NAME: &str = "gemini";
const API_KEY_HEADER: &str = "x-goog-api-key";

const GRADING_PREAMBLE: &str = "You are an experienced teaching assistant grading a student's \
exam answer. Compare the student's answer with the reference answer by meaning, not by exact \
wording. Reward correct reasoning even when phrased differently, penalise factual errors and \
missing key points, and keep feedback short, specific and addressed to the student.";

const RESPONSE_CONTRACT: &str = "Reply with a single JSON object and nothing else, using exactly \
this shape:\n{\"isCorrect\": <true|false>, \"score\": <number from 0 to 10>, \"feedback\": \
\"<feedback for the student>\", \"confidence\": <number from 0 to 1>}";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    #[serde(alias = "is_correct")]
    is_correct: bool,
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
    retry_backoff: Duration,
    template: GradingTemplate,
}

impl GeminiBackend {
    pub(crate) fn new(config: &BackendConfig) -> Result<Self, GradingError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(config.timeout))
            .timeout(config.timeout)
            .build()
            .map_err(|err| GradingError::Client(err.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            template: GradingTemplate::new(BACKEND_NAME),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_once(&self, payload: &GeminiRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let parsed: GeminiResponse =
            serde_json::from_str(&body).map_err(|err| ProviderError::Parse(err.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::Parse("reply contained no text".to_string()));
        }

        Ok(text)
    }
}

pub(crate) fn build_prompt(request: &GradingRequest) -> String {
    let mut prompt = format!(
        "{GRADING_PREAMBLE}\n\nQuestion ({question_type}):\n{question}\n\nStudent answer:\n{student}\n\nReference answer:\n{reference}\n",
        question_type = request.question_type,
        question = request.question_text.trim(),
        student = request.student_answer.trim(),
        reference = request.reference_answer.trim(),
    );

    if let Some(context) = request.context.as_deref().filter(|value| !value.trim().is_empty()) {
        prompt.push_str(&format!("\nAdditional context:\n{}\n", context.trim()));
    }

    prompt.push('\n');
    prompt.push_str(RESPONSE_CONTRACT);
    prompt
}

/// First balanced `{...}` span in `raw`, ignoring braces inside JSON strings.
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Exponential backoff, saturating instead of overflowing on large attempt counts.
pub(crate) fn retry_delay(backoff: Duration, attempt: u32) -> Duration {
    backoff.saturating_mul(2_u32.saturating_pow(attempt))
}

fn exact_match_outcome(request: &GradingRequest) -> GradingOutcome {
    let is_correct = answers_match(&request.student_answer, &request.reference_answer);
    GradingOutcome {
        is_correct,
        score: if is_correct { MAX_SCORE } else { 0.0 },
        feedback: if is_correct {
            "Answer matches the expected option.".to_string()
        } else {
            "Answer does not match the expected option.".to_string()
        },
        confidence: 1.0,
    }
}

#[async_trait]
impl CorrectionWire for GeminiBackend {
    async fn execute_correction(&self, request: &GradingRequest) -> Result<String, ProviderError> {
        let payload = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart { text: build_prompt(request) }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.2,
                max_output_tokens: 1024,
                response_mime_type: "application/json",
            },
        };

        tracing::info!(
            question_id = %request.question_id,
            model = %self.model,
            "Sending grading request to Gemini"
        );

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.send_once(&payload).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    let retryable = match err.status() {
                        Some(status) => status >= 500 || status == 408,
                        None => matches!(err, ProviderError::Timeout | ProviderError::Request(_)),
                    };
                    if !retryable {
                        return Err(err);
                    }
                    tracing::warn!(
                        question_id = %request.question_id,
                        attempt,
                        error = %err,
                        "Gemini call failed; will retry if attempts remain"
                    );
                    last_error = Some(err);
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(retry_delay(self.retry_backoff, attempt)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Request("no attempt was made".to_string())))
    }

    fn parse_response(
        &self,
        raw: &str,
        request: &GradingRequest,
    ) -> Result<GradingOutcome, ProviderError> {
        let parsed = extract_json_object(raw)
            .ok_or_else(|| ProviderError::Parse("no JSON object in reply".to_string()))
            .and_then(|json| {
                serde_json::from_str::<RawVerdict>(json)
                    .map_err(|err| ProviderError::Parse(err.to_string()))
            });

        match parsed {
            Ok(verdict) => Ok(GradingOutcome {
                is_correct: verdict.is_correct,
                score: verdict.score,
                feedback: verdict.feedback,
                confidence: verdict.confidence,
            }
            .normalized()),
            Err(err) if request.question_type == QuestionType::Closed => {
                tracing::warn!(
                    question_id = %request.question_id,
                    error = %err,
                    "Unparseable reply for closed question; comparing answers directly"
                );
                Ok(exact_match_outcome(request))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl GradingBackend for GeminiBackend {
    fn describe(&self) -> BackendMetadata {
        BackendMetadata {
            name: BACKEND_NAME,
            provider: "Google Gemini",
            model: self.model.clone(),
            supports_open_questions: true,
            supports_closed_questions: true,
        }
    }

    async fn grade(&self, request: GradingRequest) -> Result<GradingOutcome, GradingError> {
        self.template.grade(self, &request).await
    }

    fn is_ready(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
