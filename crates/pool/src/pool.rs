use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use meridian_core::Clock;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PoolError;

#[async_trait]
pub trait Factory<T>: Send + Sync {
    type Error: std::fmt::Debug + std::fmt::Display + Send + Sync + 'static;

    async fn create(&self, ctx: &CancellationToken) -> std::result::Result<T, Self::Error>;
}

#[async_trait]
pub trait HealthCheck<T>: Send + Sync {
    async fn check(&self, conn: &mut T) -> bool;
}

#[async_trait]
pub trait OnClose<T>: Send + Sync {
    async fn close(&self, conn: T);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// `Get` fails immediately with `PoolExhausted` (the default).
    FailFast,
    /// `Get` waits for a `Put` or `ctx` expiry.
    Block,
}

#[derive(Clone)]
pub struct PoolConfig {
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    /// Upper bound on idle connections (§3 Pool invariant: `idle <=
    /// max_idle`), independent from `max_size`.
    pub max_idle: usize,
    pub max_idle_time: Duration,
    pub connect_timeout: Duration,
    pub exhaustion_policy: ExhaustionPolicy,
    pub reap_interval: Duration,
    /// Under `ExhaustionPolicy::Block`, how long `get` waits for a freed
    /// slot before giving up with `DeadlineExceeded`. `None` waits until
    /// `ctx` is canceled instead, with no time bound of its own.
    pub wait_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 0,
            min_size: 0,
            max_size: 16,
            max_idle: 16,
            max_idle_time: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            exhaustion_policy: ExhaustionPolicy::FailFast,
            reap_interval: Duration::from_secs(30),
            wait_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
}

struct IdleConn<T> {
    conn: T,
    last_used: Instant,
}

struct Inner<T> {
    idle: VecDeque<IdleConn<T>>,
    active: usize,
    closed: bool,
}

/// A bounded FIFO of idle connections plus `{active, idle}` counters
/// (§3 Pool, §4.4).
pub struct Pool<T, F: Factory<T>> {
    config: PoolConfig,
    factory: Arc<F>,
    health_check: Option<Arc<dyn HealthCheck<T>>>,
    on_close: Option<Arc<dyn OnClose<T>>>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner<T>>,
    notify: tokio::sync::Notify,
    shutdown: CancellationToken,
    reaper_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl<T, F> Pool<T, F>
where
    T: Send + 'static,
    F: Factory<T> + 'static,
{
    /// Seed `initial_size` connections within `connect_timeout`. Partial
    /// failure aborts construction and closes any connections already
    /// created.
    pub async fn new(
        config: PoolConfig,
        factory: Arc<F>,
        health_check: Option<Arc<dyn HealthCheck<T>>>,
        on_close: Option<Arc<dyn OnClose<T>>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, PoolError<F::Error>> {
        let ctx = CancellationToken::new();
        let mut seeded = Vec::with_capacity(config.initial_size);
        for _ in 0..config.initial_size {
            match tokio::time::timeout(config.connect_timeout, factory.create(&ctx)).await {
                Ok(Ok(conn)) => seeded.push(conn),
                Ok(Err(e)) => {
                    for conn in seeded {
                        if let Some(oc) = &on_close {
                            oc.close(conn).await;
                        }
                    }
                    return Err(PoolError::Factory(e));
                }
                Err(_) => {
                    for conn in seeded {
                        if let Some(oc) = &on_close {
                            oc.close(conn).await;
                        }
                    }
                    return Err(PoolError::DeadlineExceeded);
                }
            }
        }

        let now = clock.now();
        let idle: VecDeque<IdleConn<T>> = seeded
            .into_iter()
            .map(|conn| IdleConn {
                conn,
                last_used: now,
            })
            .collect();

        let pool = Arc::new(Self {
            config,
            factory,
            health_check,
            on_close,
            clock,
            inner: Mutex::new(Inner {
                idle,
                active: 0,
                closed: false,
            }),
            notify: tokio::sync::Notify::new(),
            shutdown: CancellationToken::new(),
            reaper_handle: Mutex::new(None),
        });
        pool.clone().spawn_reaper();
        Ok(pool)
    }

    fn spawn_reaper(self: Arc<Self>) {
        let interval = self.config.reap_interval;
        let max_idle = self.config.max_idle_time;
        let shutdown = self.shutdown.clone();
        let pool = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => pool.reap_idle(max_idle).await,
                    _ = shutdown.cancelled() => break,
                }
            }
        });
        *self.reaper_handle.lock() = Some(handle);
    }

    async fn reap_idle(&self, max_idle: Duration) {
        let now = self.clock.now();
        let mut to_close = Vec::new();
        {
            let mut inner = self.inner.lock();
            let keep_min = self.config.min_size;
            while inner.idle.len() > keep_min {
                let stale = inner
                    .idle
                    .front()
                    .map(|c| now.saturating_duration_since(c.last_used) > max_idle)
                    .unwrap_or(false);
                if !stale {
                    break;
                }
                if let Some(c) = inner.idle.pop_front() {
                    to_close.push(c.conn);
                }
            }
        }
        if !to_close.is_empty() {
            debug!(count = to_close.len(), "reaping idle connections");
            for conn in to_close {
                if let Some(oc) = &self.on_close {
                    oc.close(conn).await;
                }
            }
        }
    }

    /// Obtain a connection, honoring `ctx` cancellation and the pool's
    /// exhaustion policy.
    pub async fn get(
        self: &Arc<Self>,
        ctx: &CancellationToken,
    ) -> Result<PooledConnection<T, F>, PoolError<F::Error>> {
        loop {
            if ctx.is_cancelled() {
                return Err(PoolError::Canceled);
            }
            enum Action<T> {
                HandOut(T),
                CreateNew,
                Wait,
                Closed,
            }
            let action = {
                let mut inner = self.inner.lock();
                if inner.closed {
                    Action::Closed
                } else if let Some(idle) = inner.idle.pop_front() {
                    inner.active += 1;
                    Action::HandOut(idle.conn)
                } else if inner.active < self.config.max_size {
                    inner.active += 1;
                    Action::CreateNew
                } else {
                    Action::Wait
                }
            };

            match action {
                Action::Closed => return Err(PoolError::Closed),
                Action::HandOut(mut conn) => {
                    if let Some(hc) = &self.health_check {
                        if hc.check(&mut conn).await {
                            return Ok(PooledConnection::new(self.clone(), conn));
                        }
                        warn!("pooled connection failed health check, replacing");
                        if let Some(oc) = &self.on_close {
                            oc.close(conn).await;
                        }
                        match tokio::time::timeout(
                            self.config.connect_timeout,
                            self.factory.create(ctx),
                        )
                        .await
                        {
                            Ok(Ok(fresh)) => return Ok(PooledConnection::new(self.clone(), fresh)),
                            Ok(Err(e)) => {
                                self.inner.lock().active -= 1;
                                return Err(PoolError::Factory(e));
                            }
                            Err(_) => {
                                self.inner.lock().active -= 1;
                                return Err(PoolError::DeadlineExceeded);
                            }
                        }
                    }
                    return Ok(PooledConnection::new(self.clone(), conn));
                }
                Action::CreateNew => {
                    match tokio::time::timeout(self.config.connect_timeout, self.factory.create(ctx))
                        .await
                    {
                        Ok(Ok(conn)) => return Ok(PooledConnection::new(self.clone(), conn)),
                        Ok(Err(e)) => {
                            self.inner.lock().active -= 1;
                            return Err(PoolError::Factory(e));
                        }
                        Err(_) => {
                            self.inner.lock().active -= 1;
                            return Err(PoolError::DeadlineExceeded);
                        }
                    }
                }
                Action::Wait => match self.config.exhaustion_policy {
                    ExhaustionPolicy::FailFast => return Err(PoolError::Exhausted),
                    ExhaustionPolicy::Block => match self.config.wait_timeout {
                        Some(timeout) => {
                            tokio::select! {
                                _ = self.notify.notified() => continue,
                                _ = ctx.cancelled() => return Err(PoolError::Canceled),
                                _ = tokio::time::sleep(timeout) => return Err(PoolError::DeadlineExceeded),
                            }
                        }
                        None => {
                            tokio::select! {
                                _ = self.notify.notified() => continue,
                                _ = ctx.cancelled() => return Err(PoolError::Canceled),
                            }
                        }
                    },
                },
            }
        }
    }

    /// Return a connection. Closes it instead of reinserting if the
    /// pool is closed or already at `max_idle`.
    async fn put(&self, conn: T) {
        enum Action<T> {
            Reinserted,
            Close(T),
        }
        let action = {
            let mut inner = self.inner.lock();
            inner.active = inner.active.saturating_sub(1);
            if inner.closed || inner.idle.len() >= self.config.max_idle {
                Action::Close(conn)
            } else {
                inner.idle.push_back(IdleConn {
                    conn,
                    last_used: self.clock.now(),
                });
                Action::Reinserted
            }
        };
        self.notify.notify_one();
        if let Action::Close(conn) = action {
            if let Some(oc) = &self.on_close {
                oc.close(conn).await;
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            active: inner.active,
            idle: inner.idle.len(),
        }
    }

    /// Close every reachable connection exactly once. Idempotent.
    pub async fn close(&self) {
        let idle: Vec<T> = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.idle.drain(..).map(|c| c.conn).collect()
        };
        for conn in idle {
            if let Some(oc) = &self.on_close {
                oc.close(conn).await;
            }
        }
        self.shutdown.cancel();
        if let Some(handle) = self.reaper_handle.lock().take() {
            let _ = handle.await;
        }
    }
}

/// RAII handle borrowed from the pool. Dropping it without calling
/// [`release`](Self::release) spawns the async return so callers that
/// forget to release explicitly still give the connection back.
pub struct PooledConnection<T, F: Factory<T>> {
    pool: Arc<Pool<T, F>>,
    conn: Option<T>,
}

impl<T, F> PooledConnection<T, F>
where
    T: Send + 'static,
    F: Factory<T> + 'static,
{
    fn new(pool: Arc<Pool<T, F>>, conn: T) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    /// Explicitly return the connection to the pool.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn).await;
        }
    }
}

impl<T, F: Factory<T>> Deref for PooledConnection<T, F> {
    type Target = T;
    fn deref(&self) -> &T {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<T, F: Factory<T>> DerefMut for PooledConnection<T, F> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<T, F> Drop for PooledConnection<T, F>
where
    T: Send + 'static,
    F: Factory<T> + 'static,
{
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.put(conn).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::MockClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct DummyError(String);
    impl std::fmt::Display for DummyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    struct CountingFactory {
        created: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait]
    impl Factory<u32> for CountingFactory {
        type Error = DummyError;
        async fn create(&self, _ctx: &CancellationToken) -> std::result::Result<u32, DummyError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(DummyError("factory failed".into()))
            } else {
                Ok(n as u32)
            }
        }
    }

    fn config(max_size: usize, policy: ExhaustionPolicy) -> PoolConfig {
        PoolConfig {
            initial_size: 0,
            min_size: 0,
            max_size,
            max_idle: max_size,
            max_idle_time: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(1),
            exhaustion_policy: policy,
            reap_interval: Duration::from_secs(3600),
            wait_timeout: None,
        }
    }

    #[tokio::test]
    async fn seeds_initial_connections() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let mut cfg = config(4, ExhaustionPolicy::FailFast);
        cfg.initial_size = 3;
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        assert_eq!(pool.stats().idle, 3);
        assert_eq!(pool.stats().active, 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn partial_seed_failure_aborts_construction() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 2,
        });
        let mut cfg = config(4, ExhaustionPolicy::FailFast);
        cfg.initial_size = 3;
        let result = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn get_then_release_recycles_connection() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let cfg = config(2, ExhaustionPolicy::FailFast);
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        let ctx = CancellationToken::new();
        let conn = pool.get(&ctx).await.unwrap();
        assert_eq!(pool.stats().active, 1);
        conn.release().await;
        assert_eq!(pool.stats().active, 0);
        assert_eq!(pool.stats().idle, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn exhaustion_fails_fast_by_default() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let cfg = config(1, ExhaustionPolicy::FailFast);
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        let ctx = CancellationToken::new();
        let _held = pool.get(&ctx).await.unwrap();
        let second = pool.get(&ctx).await;
        assert!(matches!(second, Err(PoolError::Exhausted)));
        pool.close().await;
    }

    #[tokio::test]
    async fn exhaustion_under_ctx_cancellation_when_blocking() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let cfg = config(1, ExhaustionPolicy::Block);
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        let ctx = CancellationToken::new();
        let held = pool.get(&ctx).await.unwrap();

        let wait_ctx = CancellationToken::new();
        let child = wait_ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });
        let result = pool.get(&wait_ctx).await;
        assert!(matches!(result, Err(PoolError::Canceled)));
        drop(held);
        pool.close().await;
    }

    #[tokio::test]
    async fn exhaustion_deadline_exceeded_when_blocking_with_wait_timeout() {
        // MaxSize=1, InitialSize=1: hold the only connection; a second
        // Get with a 10ms wait timeout returns DeadlineExceeded without
        // the caller ever canceling ctx itself.
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let mut cfg = config(1, ExhaustionPolicy::Block);
        cfg.wait_timeout = Some(Duration::from_millis(10));
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        let ctx = CancellationToken::new();
        let held = pool.get(&ctx).await.unwrap();

        let result = pool.get(&ctx).await;
        assert!(matches!(result, Err(PoolError::DeadlineExceeded)));
        drop(held);
        pool.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let cfg = config(2, ExhaustionPolicy::FailFast);
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        pool.close().await;
        pool.close().await;
    }

    #[tokio::test]
    async fn get_after_close_fails() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let cfg = config(2, ExhaustionPolicy::FailFast);
        let pool = Pool::new(cfg, factory, None, None, Arc::new(MockClock::new()))
            .await
            .unwrap();
        pool.close().await;
        let ctx = CancellationToken::new();
        let result = pool.get(&ctx).await;
        assert!(matches!(result, Err(PoolError::Closed)));
    }
}
