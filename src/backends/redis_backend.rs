//! Redis Backend - Remote Protocol over Redis
//!
//! Connects with the redis crate's tokio `ConnectionManager` and bounds every
//! command by the socket timeout and by a pool-sized permit count.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::traits::{Connector, RemoteConnection};

/// Builds [`RedisConnection`]s from a connection URL
#[derive(Debug, Clone)]
pub struct RedisConnector {
    redis_url: String,
    connection_timeout: Duration,
    socket_timeout: Duration,
    max_connections: usize,
}

impl RedisConnector {
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            redis_url: config.redis_url(),
            connection_timeout: config.connection_timeout(),
            socket_timeout: config.socket_timeout(),
            max_connections: config.max_connections.max(1),
        }
    }

    /// Connector for `redis_url` with default timeouts and pool size
    #[must_use]
    pub fn with_url(redis_url: &str) -> Self {
        Self::from_config(&CacheConfig {
            url: Some(redis_url.to_string()),
            ..CacheConfig::default()
        })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self) -> CacheResult<Arc<dyn RemoteConnection>> {
        info!(redis_url = %self.redis_url, "Connecting to Redis");

        let client = Client::open(self.redis_url.as_str())?;

        let conn_manager =
            tokio::time::timeout(self.connection_timeout, RedisConnectionManager::new(client))
                .await
                .map_err(|_| {
                    CacheError::Connection(format!(
                        "connect to {} timed out after {:?}",
                        self.redis_url, self.connection_timeout
                    ))
                })??;

        Ok(Arc::new(RedisConnection {
            conn_manager,
            permits: Arc::new(Semaphore::new(self.max_connections)),
            socket_timeout: self.socket_timeout,
        }))
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

/// One Redis connection manager with bounded commands
pub struct RedisConnection {
    conn_manager: RedisConnectionManager,
    permits: Arc<Semaphore>,
    socket_timeout: Duration,
}

impl RedisConnection {
    async fn bounded<T, F>(&self, command: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>> + Send,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CacheError::Connection("connection closed".to_string()))?;

        match tokio::time::timeout(self.socket_timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Connection(format!(
                "{command} timed out after {:?}",
                self.socket_timeout
            ))),
        }
    }
}

#[async_trait]
impl RemoteConnection for RedisConnection {
    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        self.bounded("GET", conn.get::<_, Option<Vec<u8>>>(key))
            .await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn_manager.clone();
        self.bounded("SETEX", conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)))
            .await?;
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[Redis] Cached key with TTL");
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn_manager.clone();
        let count: usize = self.bounded("DEL", conn.del(keys)).await?;
        debug!(count = count, "[Redis] Removed keys");
        Ok(count)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> CacheResult<(u64, Vec<String>)> {
        let mut conn = self.conn_manager.clone();
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count);
        self.bounded("SCAN", cmd.query_async(&mut conn)).await
    }

    async fn close(&self) {
        self.permits.close();
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
