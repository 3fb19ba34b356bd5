use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::core::config::WorkerSettings;

/// Bounds calls to the grading provider: at most `max_concurrent` gradings
/// in flight, each holding its slot for an extra `interval` after finishing.
#[derive(Clone)]
pub(crate) struct PacingGate {
    permits: Arc<Semaphore>,
    interval: Duration,
}

pub(crate) struct PacingPermit {
    _permit: OwnedSemaphorePermit,
    interval: Duration,
}

impl PacingGate {
    pub(crate) fn new(max_concurrent: usize, interval: Duration) -> Self {
        Self { permits: Arc::new(Semaphore::new(max_concurrent.max(1))), interval }
    }

    pub(crate) fn from_settings(worker: &WorkerSettings) -> Self {
        Self::new(worker.max_concurrent_gradings, worker.pacing_delay)
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub(crate) async fn acquire(&self) -> Result<PacingPermit, AcquireError> {
        let permit = self.permits.clone().acquire_owned().await?;
        Ok(PacingPermit { _permit: permit, interval: self.interval })
    }
}

impl PacingPermit {
    /// Waits out the pacing interval, then frees the slot.
    pub(crate) async fn release_after_interval(self) {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
    }
}
