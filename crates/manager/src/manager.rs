use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use meridian_breaker::{BreakerError, BreakerStats, CircuitBreaker};
use meridian_ratelimit::{RateLimitMetrics, RateLimiter};
use meridian_tracker::{ConnectionTracker, TrackerStats};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ManagerError, Result};

#[async_trait]
pub trait OnConnect<T>: Send + Sync {
    async fn on_connect(&self, conn: &T);
}

#[async_trait]
pub trait OnDisconnect<T>: Send + Sync {
    async fn on_disconnect(&self, conn: &T);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    pub max_connections: usize,
    pub keep_alive: bool,
    pub idle_timeout: Duration,
    pub rate_limit_enabled: bool,
    pub breaker_enabled: bool,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            keep_alive: true,
            idle_timeout: Duration::from_secs(300),
            rate_limit_enabled: true,
            breaker_enabled: true,
        }
    }
}

/// RAII handle for a tracked session task. Held for the task's lifetime;
/// dropping it decrements the manager's in-flight session count and wakes
/// anyone waiting in [`ConnectionManager::stop`].
pub struct SessionGuard<T> {
    manager: Arc<ConnectionManager<T>>,
}

impl<T> Drop for SessionGuard<T> {
    fn drop(&mut self) {
        if self.manager.active_sessions.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.manager.idle_notify.notify_waiters();
        }
    }
}

/// Composes the breaker, limiter, and tracker behind a single admission
/// surface (§4.6). Generic over the connection type `T` so the same
/// manager serves both the server's accepted sockets and the client's
/// dialed ones.
pub struct ConnectionManager<T> {
    config: ConnectionManagerConfig,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    tracker: Arc<ConnectionTracker>,
    connections: DashMap<String, Arc<T>>,
    shutdown: CancellationToken,
    active_sessions: AtomicUsize,
    idle_notify: tokio::sync::Notify,
    on_connect: Option<Arc<dyn OnConnect<T>>>,
    on_disconnect: Option<Arc<dyn OnDisconnect<T>>>,
}

impl<T> ConnectionManager<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        config: ConnectionManagerConfig,
        breaker: Arc<CircuitBreaker>,
        limiter: Arc<RateLimiter>,
        tracker: Arc<ConnectionTracker>,
        on_connect: Option<Arc<dyn OnConnect<T>>>,
        on_disconnect: Option<Arc<dyn OnDisconnect<T>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            breaker,
            limiter,
            tracker,
            connections: DashMap::new(),
            shutdown: CancellationToken::new(),
            active_sessions: AtomicUsize::new(0),
            idle_notify: tokio::sync::Notify::new(),
            on_connect,
            on_disconnect,
        })
    }

    /// Token sessions should select on alongside their own I/O to notice a
    /// manager-wide shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Registers a just-launched session task, returning a guard that
    /// deregisters it on drop.
    pub fn register_session(self: &Arc<Self>) -> SessionGuard<T> {
        self.active_sessions.fetch_add(1, Ordering::AcqRel);
        SessionGuard {
            manager: self.clone(),
        }
    }

    /// Admission for an inbound connection already accepted and
    /// TLS-handshaked by the caller (§4.6 Accept). Checks `MaxConnections`,
    /// consults the rate limiter keyed on `addr` if enabled, and rejects if
    /// the breaker is not closed. On acceptance, registers the connection
    /// in the tracker and fires `onConnect`.
    pub async fn accept<E>(&self, addr: &str, conn: T) -> Result<Arc<T>, E> {
        if self.connections.len() >= self.config.max_connections {
            return Err(ManagerError::MaxConnectionsReached);
        }
        if self.config.rate_limit_enabled && !self.limiter.allow(addr) {
            return Err(ManagerError::RateLimited);
        }
        if self.config.breaker_enabled && self.breaker.state() != meridian_breaker::CircuitState::Closed {
            return Err(ManagerError::Breaker(BreakerError::Open));
        }

        let conn = Arc::new(conn);
        self.tracker.track(addr);
        self.connections.insert(addr.to_string(), conn.clone());
        if let Some(hook) = &self.on_connect {
            hook.on_connect(&conn).await;
        }
        info!(addr, "connection accepted");
        Ok(conn)
    }

    /// Outbound admission (§4.6 Connect). Runs `dial` through the breaker;
    /// failures feed the breaker's failure count, successes are tracked
    /// identically to `accept`.
    pub async fn connect<F, Fut, E>(&self, addr: &str, dial: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Debug + std::fmt::Display,
    {
        let conn = self
            .breaker
            .execute(dial)
            .await
            .map_err(ManagerError::Breaker)?;

        let conn = Arc::new(conn);
        self.tracker.track(addr);
        self.connections.insert(addr.to_string(), conn.clone());
        if let Some(hook) = &self.on_connect {
            hook.on_connect(&conn).await;
        }
        info!(addr, "connection established");
        Ok(conn)
    }

    /// Untracks and removes `addr`, firing `onDisconnect` if the connection
    /// was still registered (§4.6 Remove, §4.7).
    pub async fn remove(&self, addr: &str) {
        if let Some((_, conn)) = self.connections.remove(addr) {
            self.tracker.untrack(addr);
            if let Some(hook) = &self.on_disconnect {
                hook.on_disconnect(&conn).await;
            }
            debug!(addr, "connection removed");
        }
    }

    pub fn record_sent(&self, addr: &str, delta: u64) {
        self.tracker.record_sent(addr, delta);
    }

    pub fn record_received(&self, addr: &str, delta: u64) {
        self.tracker.record_received(addr, delta);
    }

    pub fn connections(&self) -> Vec<String> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn state(&self) -> ManagerState {
        if !self.shutdown.is_cancelled() {
            ManagerState::Running
        } else if self.active_sessions.load(Ordering::Acquire) > 0 {
            ManagerState::Stopping
        } else {
            ManagerState::Stopped
        }
    }

    pub fn circuit_breaker_stats(&self) -> BreakerStats {
        self.breaker.stats()
    }

    pub fn rate_limit_metrics(&self) -> RateLimitMetrics {
        self.limiter.metrics()
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.config
    }

    /// Signals cancellation to every tracked session and waits for all of
    /// them to exit before returning (§4.6 Stop).
    pub async fn stop(&self) {
        self.shutdown.cancel();
        while self.active_sessions.load(Ordering::Acquire) > 0 {
            self.idle_notify.notified().await;
        }
    }
}
