use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;

use super::{CorrectionJob, QueueTransport, TransportError};
use crate::core::config::QueueSettings;

const RETRIES_HEADER: &str = "Upstash-Retries";
const DEDUPLICATION_HEADER: &str = "Upstash-Deduplication-Id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueReply {
    message_id: String,
}

/// Publishes to a hosted HTTP queue that later POSTs each job to the webhook.
pub(crate) struct HttpQueueTransport {
    client: Client,
    settings: QueueSettings,
}

impl HttpQueueTransport {
    pub(crate) fn new(settings: QueueSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.publish_timeout_seconds))
            .build()
            .map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn enqueue_url(&self) -> String {
        format!(
            "{}/v2/enqueue/{}/{}",
            self.settings.base_url, self.settings.queue_name, self.settings.webhook_url
        )
    }
}

#[async_trait]
impl QueueTransport for HttpQueueTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn missing_setting(&self) -> Option<&'static str> {
        self.settings.missing_setting()
    }

    async fn enqueue(&self, job: &CorrectionJob) -> Result<String, TransportError> {
        let body = serde_json::to_vec(job)?;
        let retries = self.settings.max_delivery_attempts.saturating_sub(1);

        let response = self
            .client
            .post(self.enqueue_url())
            .bearer_auth(&self.settings.token)
            .header(CONTENT_TYPE, "application/json")
            .header(RETRIES_HEADER, retries.to_string())
            .header(DEDUPLICATION_HEADER, job.deduplication_id())
            .body(body)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Rejected { status: status.as_u16(), body });
        }

        let reply: EnqueueReply =
            response.json().await.map_err(|err| TransportError::Request(err.to_string()))?;
        Ok(reply.message_id)
    }
}
