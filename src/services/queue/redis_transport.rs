use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CorrectionJob, QueueTransport, TransportError};
use crate::core::redis::RedisHandle;

pub(crate) const QUEUE_PREFIX: &str = "grading:queue";

pub(crate) fn queue_key(queue_name: &str) -> String {
    format!("{QUEUE_PREFIX}:{queue_name}")
}

/// What sits in the Redis list: the job plus its delivery bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueueEnvelope {
    pub(crate) message_id: String,
    pub(crate) attempt: u32,
    pub(crate) job: CorrectionJob,
}

impl QueueEnvelope {
    pub(crate) fn first_delivery(job: CorrectionJob) -> Self {
        Self { message_id: Uuid::new_v4().to_string(), attempt: 1, job }
    }

    pub(crate) fn redelivery(&self) -> Self {
        Self { attempt: self.attempt + 1, ..self.clone() }
    }
}

/// FIFO list transport drained by the local worker process.
pub(crate) struct RedisQueueTransport {
    redis: RedisHandle,
    queue_name: String,
}

impl RedisQueueTransport {
    pub(crate) fn new(redis: RedisHandle, queue_name: String) -> Self {
        Self { redis, queue_name }
    }
}

#[async_trait]
impl QueueTransport for RedisQueueTransport {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn missing_setting(&self) -> Option<&'static str> {
        if self.queue_name.trim().is_empty() {
            Some("QUEUE_NAME")
        } else {
            None
        }
    }

    async fn ensure_available(&self) -> Result<(), TransportError> {
        if self.redis.is_connected().await {
            Ok(())
        } else {
            Err(TransportError::Unavailable("redis is not connected".to_string()))
        }
    }

    async fn enqueue(&self, job: &CorrectionJob) -> Result<String, TransportError> {
        let envelope = QueueEnvelope::first_delivery(job.clone());
        let payload = serde_json::to_string(&envelope)?;

        self.redis
            .push_back(&queue_key(&self.queue_name), &payload)
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;

        Ok(envelope.message_id)
    }
}
