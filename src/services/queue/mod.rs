mod http_transport;
mod job;
mod redis_transport;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;

use crate::core::config::{QueueTransportKind, Settings};
use crate::core::redis::RedisHandle;

pub(crate) use http_transport::HttpQueueTransport;
pub(crate) use job::{CorrectionJob, GradingJobPayload};
pub(crate) use redis_transport::{queue_key, QueueEnvelope, RedisQueueTransport};

#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error("queue transport is not configured: missing {0}")]
    NotConfigured(&'static str),
    #[error("queue transport unavailable: {0}")]
    Unavailable(String),
    #[error("queue rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("queue request failed: {0}")]
    Request(String),
    #[error("failed to encode queue message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Something that can hand one job to the delivery mechanism.
#[async_trait]
pub(crate) trait QueueTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// First setting the transport still needs before it can publish.
    fn missing_setting(&self) -> Option<&'static str>;

    /// Batch-level precondition; an error here fails a whole batch.
    async fn ensure_available(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn enqueue(&self, job: &CorrectionJob) -> Result<String, TransportError>;
}

#[derive(Clone)]
pub(crate) struct QueuePublisher {
    transport: Arc<dyn QueueTransport>,
}

impl QueuePublisher {
    pub(crate) fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    pub(crate) fn from_settings(
        settings: &Settings,
        redis: RedisHandle,
    ) -> Result<Self, TransportError> {
        let queue = settings.queue();
        let transport: Arc<dyn QueueTransport> = match queue.transport {
            QueueTransportKind::Http => Arc::new(HttpQueueTransport::new(queue.clone())?),
            QueueTransportKind::Redis => {
                Arc::new(RedisQueueTransport::new(redis, queue.queue_name.clone()))
            }
        };
        Ok(Self::new(transport))
    }

    pub(crate) fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub(crate) fn missing_setting(&self) -> Option<&'static str> {
        self.transport.missing_setting()
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.missing_setting().is_none()
    }

    pub(crate) async fn publish(&self, job: &CorrectionJob) -> Result<String, TransportError> {
        if let Some(setting) = self.missing_setting() {
            return Err(TransportError::NotConfigured(setting));
        }

        let message_id = self.transport.enqueue(job).await?;
        tracing::debug!(
            transport = self.transport.name(),
            message_id = %message_id,
            submission_id = %job.submission_id,
            question_id = %job.question_id,
            "Correction job enqueued"
        );
        Ok(message_id)
    }

    /// Publishes every job concurrently. Per-job failures are logged and left
    /// out of the returned ids; only a transport that cannot take any job at
    /// all fails the call.
    pub(crate) async fn publish_batch(
        &self,
        jobs: &[CorrectionJob],
    ) -> Result<Vec<String>, TransportError> {
        if let Some(setting) = self.missing_setting() {
            return Err(TransportError::NotConfigured(setting));
        }
        self.transport.ensure_available().await?;

        let results = join_all(jobs.iter().map(|job| self.publish(job))).await;

        let mut message_ids = Vec::with_capacity(jobs.len());
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(message_id) => {
                    metrics::counter!("correction_jobs_published_total", "status" => "ok")
                        .increment(1);
                    message_ids.push(message_id);
                }
                Err(err) => {
                    metrics::counter!("correction_jobs_published_total", "status" => "failed")
                        .increment(1);
                    tracing::warn!(
                        transport = self.transport.name(),
                        submission_id = %job.submission_id,
                        question_id = %job.question_id,
                        error = %err,
                        "Failed to enqueue correction job"
                    );
                }
            }
        }

        Ok(message_ids)
    }
}
