use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client, ErrorKind, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn is_connected(&self) -> bool {
        self.manager.read().await.is_some()
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, RedisError> {
        self.manager
            .read()
            .await
            .clone()
            .ok_or_else(|| RedisError::from((ErrorKind::IoError, "redis is not connected")))
    }

    /// RPUSH, so the list drains first-in first-out.
    pub(crate) async fn push_back(&self, key: &str, payload: &str) -> Result<(), RedisError> {
        let mut manager = self.connection().await?;
        manager.rpush::<_, _, ()>(key, payload).await
    }

    /// Opens a connection of its own for blocking commands, leaving the shared one free.
    pub(crate) async fn blocking_connection(&self) -> Result<BlockingConnection, RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        Ok(BlockingConnection { manager })
    }
}

/// Connection owned by one consumer loop.
pub(crate) struct BlockingConnection {
    manager: ConnectionManager,
}

impl BlockingConnection {
    /// Blocking BLPOP; `None` when the timeout elapses with the list empty.
    pub(crate) async fn pop_front(
        &mut self,
        key: &str,
        timeout_seconds: f64,
    ) -> Result<Option<String>, RedisError> {
        let popped: Option<(String, String)> = self.manager.blpop(key, timeout_seconds).await?;
        Ok(popped.map(|(_, payload)| payload))
    }
}
