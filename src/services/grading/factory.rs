use std::sync::Arc;
use std::time::Duration;

use super::gemini::GeminiBackend;
use super::template::{DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT};
use super::{GradingBackend, GradingError};
use crate::core::config::AiSettings;

/// Every model the pipeline can grade with. The factory switch, the support
/// check and the listing all read from this enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupportedModel {
    Gemini25Flash,
}

impl SupportedModel {
    pub(crate) const ALL: &'static [SupportedModel] = &[SupportedModel::Gemini25Flash];

    pub(crate) fn id(self) -> &'static str {
        match self {
            Self::Gemini25Flash => "gemini-2.5-flash",
        }
    }

    pub(crate) fn parse(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|model| model.id() == id.trim())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BackendConfig {
    pub(crate) model: String,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) max_retries: u32,
    pub(crate) retry_backoff: Duration,
}

impl BackendConfig {
    pub(crate) fn new(model: &str, api_key: &str, base_url: &str) -> Self {
        Self {
            model: model.trim().to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub(crate) fn from_settings(ai: &AiSettings, model: &str) -> Self {
        Self {
            timeout: ai.request_timeout(),
            max_retries: ai.max_retries,
            retry_backoff: ai.retry_backoff(),
            ..Self::new(model, &ai.gemini_api_key, &ai.gemini_base_url)
        }
    }
}

pub(crate) struct GradingBackendFactory;

impl GradingBackendFactory {
    pub(crate) fn create(config: &BackendConfig) -> Result<Arc<dyn GradingBackend>, GradingError> {
        let model = SupportedModel::parse(&config.model)
            .ok_or_else(|| GradingError::UnsupportedModel(config.model.clone()))?;

        match model {
            SupportedModel::Gemini25Flash => Ok(Arc::new(GeminiBackend::new(config)?)),
        }
    }

    pub(crate) fn list_supported_models() -> Vec<&'static str> {
        SupportedModel::ALL.iter().map(|model| model.id()).collect()
    }

    pub(crate) fn is_supported(id: &str) -> bool {
        SupportedModel::parse(id).is_some()
    }
}
