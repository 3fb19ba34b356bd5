mod error;
mod orchestrator;
mod worker;

pub(crate) use error::{CorrectionError, ErrorKind};
pub(crate) use orchestrator::{CorrectionOrchestrator, TriggerResult};
pub(crate) use worker::{GradingWorker, GradingWorkerResult};
