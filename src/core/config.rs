mod parsing;
mod settings;
mod types;

pub(crate) use types::{
    AiSettings, ConfigError, Environment, QueueSettings, QueueTransportKind, Settings,
    WorkerSettings,
};
