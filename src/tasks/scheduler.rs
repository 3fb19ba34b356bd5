use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use crate::core::config::{QueueTransportKind, Settings};
use crate::core::redis::{BlockingConnection, RedisHandle};
use crate::services::queue::{queue_key, QueueEnvelope};

const POP_TIMEOUT_SECONDS: f64 = 2.0;
const REDIS_ERROR_BACKOFF: Duration = Duration::from_secs(2);
const MESSAGE_ID_HEADER: &str = "x-request-id";
const ATTEMPT_HEADER: &str = "x-queue-attempt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Completed,
    Requeued,
    Dropped,
}

#[derive(Debug)]
enum Rejection {
    Permanent(String),
    Transient(String),
}

/// Hands queued jobs to the API's grading webhook. The API process is the only
/// writer of the store, so this side never opens it.
pub(crate) struct WebhookDelivery {
    client: Client,
    webhook_url: String,
    redis: RedisHandle,
    queue_key: String,
    max_attempts: u32,
}

impl WebhookDelivery {
    pub(crate) fn from_settings(settings: &Settings, redis: RedisHandle) -> Result<Self> {
        let queue = settings.queue();
        if queue.webhook_url.is_empty() {
            bail!("the delivery worker needs GRADING_WEBHOOK_URL");
        }

        let client = Client::builder()
            .timeout(settings.worker().delivery_timeout())
            .build()
            .context("Failed to build the webhook client")?;

        Ok(Self {
            client,
            webhook_url: queue.webhook_url.clone(),
            redis,
            queue_key: queue_key(&queue.queue_name),
            max_attempts: queue.max_delivery_attempts,
        })
    }

    /// Posts one queued message to the webhook, requeueing transient failures.
    pub(crate) async fn deliver(&self, payload: &str) -> Delivery {
        let envelope: QueueEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(error = %err, "Dropping malformed queue message");
                return Delivery::Dropped;
            }
        };

        let reason = match self.post(&envelope).await {
            Ok(()) => {
                tracing::info!(
                    message_id = %envelope.message_id,
                    submission_id = %envelope.job.submission_id,
                    question_id = %envelope.job.question_id,
                    attempt = envelope.attempt,
                    "Queued correction delivered"
                );
                return Delivery::Completed;
            }
            Err(Rejection::Permanent(reason)) => {
                tracing::error!(
                    message_id = %envelope.message_id,
                    attempt = envelope.attempt,
                    error = %reason,
                    "Dropping correction job"
                );
                return Delivery::Dropped;
            }
            Err(Rejection::Transient(reason)) => reason,
        };

        if envelope.attempt >= self.max_attempts {
            tracing::error!(
                message_id = %envelope.message_id,
                attempt = envelope.attempt,
                max_attempts = self.max_attempts,
                error = %reason,
                "Dropping correction job after its last attempt"
            );
            return Delivery::Dropped;
        }

        let redelivery = match serde_json::to_string(&envelope.redelivery()) {
            Ok(redelivery) => redelivery,
            Err(err) => {
                tracing::error!(
                    message_id = %envelope.message_id,
                    error = %err,
                    "Failed to encode redelivery"
                );
                return Delivery::Dropped;
            }
        };

        match self.redis.push_back(&self.queue_key, &redelivery).await {
            Ok(()) => {
                tracing::warn!(
                    message_id = %envelope.message_id,
                    attempt = envelope.attempt,
                    error = %reason,
                    "Correction job requeued"
                );
                Delivery::Requeued
            }
            Err(err) => {
                tracing::error!(
                    message_id = %envelope.message_id,
                    error = %err,
                    "Failed to requeue correction job"
                );
                Delivery::Dropped
            }
        }
    }

    async fn post(&self, envelope: &QueueEnvelope) -> Result<(), Rejection> {
        let response = self
            .client
            .post(&self.webhook_url)
            .header(MESSAGE_ID_HEADER, &envelope.message_id)
            .header(ATTEMPT_HEADER, envelope.attempt.to_string())
            .json(&envelope.job)
            .send()
            .await
            .map_err(|err| Rejection::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!("webhook returned {status}: {body}");
        if is_retryable(status) {
            Err(Rejection::Transient(detail))
        } else {
            Err(Rejection::Permanent(detail))
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Drains the Redis queue until shutdown, one delivery loop per configured slot.
pub(crate) async fn run(settings: &Settings, redis: RedisHandle) -> Result<()> {
    let queue = settings.queue();
    if queue.transport != QueueTransportKind::Redis {
        bail!(
            "the delivery worker needs QUEUE_TRANSPORT=redis (configured: {})",
            queue.transport.as_str()
        );
    }
    let delivery = Arc::new(WebhookDelivery::from_settings(settings, redis)?);
    if !delivery.redis.is_connected().await {
        bail!("the delivery worker needs a Redis connection");
    }

    let concurrency = settings.worker().delivery_concurrency;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(concurrency);
    for slot in 0..concurrency {
        handles.push(tokio::spawn(delivery_loop(delivery.clone(), slot, shutdown_rx.clone())));
    }
    tracing::info!(
        queue = %delivery.queue_key,
        webhook = %delivery.webhook_url,
        concurrency,
        "Delivery worker started"
    );

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to delivery loops");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Delivery loop join failed");
        }
    }

    Ok(())
}

async fn delivery_loop(
    delivery: Arc<WebhookDelivery>,
    slot: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    // BLPOP holds its connection for the whole timeout, so every loop owns one.
    let mut connection: Option<BlockingConnection> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }

        if connection.is_none() {
            match delivery.redis.blocking_connection().await {
                Ok(opened) => connection = Some(opened),
                Err(err) => {
                    tracing::error!(slot, error = %err, "Failed to open delivery connection");
                    if backoff_or_shutdown(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            }
        }
        let Some(conn) = connection.as_mut() else {
            continue;
        };

        // BLPOP is not raced against shutdown so a popped message is never dropped.
        match conn.pop_front(&delivery.queue_key, POP_TIMEOUT_SECONDS).await {
            Ok(Some(payload)) => {
                delivery.deliver(&payload).await;
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(slot, error = %err, "Failed to pop correction job");
                connection = None;
                if backoff_or_shutdown(&mut shutdown).await {
                    break;
                }
            }
        }
    }

    tracing::debug!(slot, "Delivery loop stopped");
}

/// Waits out the Redis backoff; `true` when shutdown arrived first.
async fn backoff_or_shutdown(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = sleep(REDIS_ERROR_BACKOFF) => false,
    }
}
