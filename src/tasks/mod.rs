pub(crate) mod correction;
pub(crate) mod pacing;
pub(crate) mod scheduler;
