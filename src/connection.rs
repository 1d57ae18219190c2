//! Connection Manager
//!
//! Owns at most one live connection to the remote backend, pings it on a
//! fixed interval, and replaces it when a ping fails. Access is gated by a
//! [`CircuitBreaker`] that only the health-check loop feeds.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::traits::{Connector, RemoteConnection};

/// State shared with the health-check task
struct Shared {
    connector: Arc<dyn Connector>,
    breaker: Arc<CircuitBreaker>,
    connection: RwLock<Option<Arc<dyn RemoteConnection>>>,
}

impl Shared {
    /// Connect and ping; only a connection that answers PING is returned
    async fn open_connection(&self) -> CacheResult<Arc<dyn RemoteConnection>> {
        let conn = self.connector.connect().await?;
        if let Err(e) = conn.ping().await {
            conn.close().await;
            return Err(e);
        }
        Ok(conn)
    }

    async fn check_health(&self) {
        let current = self.connection.read().clone();
        match current {
            Some(conn) => match conn.ping().await {
                Ok(()) => {
                    debug!(backend = conn.name(), "Health check passed");
                    self.breaker.record_success();
                }
                Err(e) => {
                    warn!(error = %e, backend = conn.name(), "Health check failed, reconnecting");
                    self.breaker.record_failure();
                    self.try_reconnect().await;
                }
            },
            None => {
                debug!("No live connection, attempting reconnect");
                self.try_reconnect().await;
            }
        }
    }

    async fn try_reconnect(&self) {
        let previous = self.connection.write().take();
        if let Some(conn) = previous {
            conn.close().await;
        }

        match self.open_connection().await {
            Ok(conn) => {
                info!(backend = self.connector.name(), "Reconnected to remote cache");
                *self.connection.write() = Some(conn);
            }
            Err(e) => {
                error!(error = %e, backend = self.connector.name(), "Reconnect failed");
                self.breaker.record_failure();
            }
        }
    }
}

/// Manager for the single remote connection
pub struct ConnectionManager {
    shared: Arc<Shared>,
    health_check_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        breaker: Arc<CircuitBreaker>,
        health_check_interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                connector,
                breaker,
                connection: RwLock::new(None),
            }),
            health_check_interval,
            shutdown_tx,
            health_task: Mutex::new(None),
        }
    }

    /// Build a manager whose breaker and interval come from `config`
    #[must_use]
    pub fn from_config(connector: Arc<dyn Connector>, config: &CacheConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.failure_threshold,
            config.reset_timeout(),
        ));
        Self::new(connector, breaker, config.health_check_interval())
    }

    /// Connect, ping, and start the health-check loop
    ///
    /// Returns `false` and leaves the connection unset on any failure.
    pub async fn initialize(&self) -> bool {
        info!(backend = self.shared.connector.name(), "Initializing remote connection");

        match self.shared.open_connection().await {
            Ok(conn) => {
                let previous = self.shared.connection.write().replace(conn);
                if let Some(previous) = previous {
                    previous.close().await;
                }
                self.start_health_checks();
                info!(
                    backend = self.shared.connector.name(),
                    interval_secs = self.health_check_interval.as_secs_f64(),
                    "Remote connection ready"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, backend = self.shared.connector.name(), "Remote connection unavailable");
                false
            }
        }
    }

    fn start_health_checks(&self) {
        let mut task = self.health_task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let interval = self.health_check_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.recv() => {
                        debug!("Health-check loop shutting down");
                        break;
                    }
                }
                // A reconnect can outlast the interval; shutdown abandons it
                tokio::select! {
                    () = shared.check_health() => {}
                    _ = shutdown_rx.recv() => {
                        debug!("Health-check loop shutting down during a check");
                        break;
                    }
                }
            }
        }));
    }

    /// Live connection, if the breaker allows an attempt
    ///
    /// Never performs I/O.
    ///
    /// # Errors
    ///
    /// [`CacheError::CircuitOpen`] when the breaker denies the attempt,
    /// [`CacheError::NotInitialized`] when no connection exists.
    pub fn get_connection(&self) -> CacheResult<Arc<dyn RemoteConnection>> {
        if !self.shared.breaker.is_allowed() {
            return Err(CacheError::CircuitOpen);
        }
        self.shared
            .connection
            .read()
            .clone()
            .ok_or(CacheError::NotInitialized)
    }

    /// Run one health-check round now, outside the periodic loop
    pub async fn check_health(&self) {
        self.shared.check_health().await;
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connection.read().is_some()
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.shared.breaker
    }

    /// Stop the health-check loop and release the connection; idempotent
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(());

        let task = self.health_task.lock().take();
        if let Some(handle) = task {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health-check task ended abnormally");
            }
        }

        let conn = self.shared.connection.write().take();
        if let Some(conn) = conn {
            conn.close().await;
            info!(backend = conn.name(), "Remote connection closed");
        }
    }
}
