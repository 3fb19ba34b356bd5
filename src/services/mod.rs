pub(crate) mod closed_correction;
pub(crate) mod grading;
pub(crate) mod queue;
