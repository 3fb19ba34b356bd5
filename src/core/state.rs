use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::db::Database;
use crate::services::closed_correction::ClosedQuestionCorrector;
use crate::services::queue::QueuePublisher;
use crate::tasks::correction::{CorrectionOrchestrator, GradingWorker};
use crate::tasks::pacing::PacingGate;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: Database,
    redis: RedisHandle,
    publisher: QueuePublisher,
    orchestrator: CorrectionOrchestrator,
    worker: GradingWorker,
    closed_corrector: ClosedQuestionCorrector,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: Database,
        redis: RedisHandle,
        publisher: QueuePublisher,
    ) -> Self {
        let orchestrator = CorrectionOrchestrator::new(db.clone(), publisher.clone());
        let worker = GradingWorker::new(
            db.clone(),
            settings.ai().clone(),
            PacingGate::from_settings(settings.worker()),
        );
        let closed_corrector = ClosedQuestionCorrector::new(db.clone());

        Self {
            inner: Arc::new(InnerState {
                settings,
                db,
                redis,
                publisher,
                orchestrator,
                worker,
                closed_corrector,
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &Database {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn publisher(&self) -> &QueuePublisher {
        &self.inner.publisher
    }

    pub(crate) fn orchestrator(&self) -> &CorrectionOrchestrator {
        &self.inner.orchestrator
    }

    pub(crate) fn worker(&self) -> &GradingWorker {
        &self.inner.worker
    }

    pub(crate) fn closed_corrector(&self) -> &ClosedQuestionCorrector {
        &self.inner.closed_corrector
    }
}
