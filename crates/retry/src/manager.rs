use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meridian_pool::Factory;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{RetryError, Result};

/// Connection-establishment retry policy (spec §4.5).
///
/// Three phases run in order: `Immediate` attempts at a fixed interval,
/// `Gradual` attempts with a doubling interval capped at
/// `max_gradual_interval`, and an optional unbounded `Persistent` phase
/// at a fixed interval that only a cancellation can stop.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub immediate_attempts: u32,
    pub immediate_interval: Duration,
    pub gradual_attempts: u32,
    pub gradual_interval: Duration,
    pub max_gradual_interval: Duration,
    pub persistent_enabled: bool,
    pub persistent_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            immediate_attempts: 3,
            immediate_interval: Duration::from_millis(100),
            gradual_attempts: 5,
            gradual_interval: Duration::from_secs(1),
            max_gradual_interval: Duration::from_secs(30),
            persistent_enabled: false,
            persistent_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
struct CountersInner {
    attempts: AtomicU64,
    failures: AtomicU64,
    successes: AtomicU64,
}

/// Cumulative counters across every call to [`RetryManager::get`].
#[derive(Debug, Default)]
pub struct RetryCounters {
    inner: CountersInner,
}

impl RetryCounters {
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.inner.successes.load(Ordering::Relaxed)
    }
}

/// Drives a [`Factory`] through the three-phase retry policy.
pub struct RetryManager<T, F: Factory<T>> {
    config: RetryConfig,
    factory: Arc<F>,
    counters: RetryCounters,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F: Factory<T>> RetryManager<T, F> {
    pub fn new(config: RetryConfig, factory: Arc<F>) -> Self {
        Self {
            config,
            factory,
            counters: RetryCounters::default(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn counters(&self) -> &RetryCounters {
        &self.counters
    }

    /// Runs the factory through Immediate, then Gradual, then (if enabled)
    /// Persistent phases, returning the first success. Every sleep races
    /// against `ctx` cancellation.
    pub async fn get(&self, ctx: &CancellationToken) -> Result<T, F::Error> {
        let mut last_error: Option<F::Error> = None;

        if let Some(result) = self
            .run_phase(
                ctx,
                "immediate",
                self.config.immediate_attempts,
                self.config.immediate_interval,
                &mut last_error,
            )
            .await?
        {
            return self.finish_success(result);
        }

        if let Some(result) = self.run_gradual_phase(ctx, &mut last_error).await? {
            return self.finish_success(result);
        }

        if self.config.persistent_enabled {
            loop {
                if ctx.is_cancelled() {
                    return Err(RetryError::Canceled);
                }
                self.counters.inner.attempts.fetch_add(1, Ordering::Relaxed);
                match self.factory.create(ctx).await {
                    Ok(conn) => return self.finish_success(conn),
                    Err(e) => {
                        warn!(phase = "persistent", error = %e, "retry attempt failed");
                        last_error = Some(e);
                    }
                }
                if self.sleep_or_cancel(ctx, self.config.persistent_interval).await {
                    return Err(RetryError::Canceled);
                }
            }
        }

        self.counters.inner.failures.fetch_add(1, Ordering::Relaxed);
        Err(RetryError::MaxRetriesExceeded(last_error))
    }

    fn finish_success(&self, conn: T) -> Result<T, F::Error> {
        self.counters.inner.successes.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    /// Runs a fixed-interval phase for up to `attempts` tries. Returns
    /// `Ok(Some(conn))` on success, `Ok(None)` if the phase exhausts without
    /// success, `Err(Canceled)` if `ctx` fires mid-phase.
    async fn run_phase(
        &self,
        ctx: &CancellationToken,
        phase: &'static str,
        attempts: u32,
        interval: Duration,
        last_error: &mut Option<F::Error>,
    ) -> Result<Option<T>, F::Error> {
        for attempt in 0..attempts {
            if ctx.is_cancelled() {
                return Err(RetryError::Canceled);
            }
            self.counters.inner.attempts.fetch_add(1, Ordering::Relaxed);
            match self.factory.create(ctx).await {
                Ok(conn) => return Ok(Some(conn)),
                Err(e) => {
                    debug!(phase, attempt, error = %e, "retry attempt failed");
                    *last_error = Some(e);
                }
            }
            if attempt + 1 < attempts && self.sleep_or_cancel(ctx, interval).await {
                return Err(RetryError::Canceled);
            }
        }
        Ok(None)
    }

    /// Runs the Gradual phase: interval doubles after each failed attempt,
    /// capped at `max_gradual_interval`. Stores the last error it observed
    /// into `last_error` for diagnostics if every phase exhausts.
    async fn run_gradual_phase(
        &self,
        ctx: &CancellationToken,
        last_error: &mut Option<F::Error>,
    ) -> Result<Option<T>, F::Error> {
        let mut interval = self.config.gradual_interval;
        for attempt in 0..self.config.gradual_attempts {
            if ctx.is_cancelled() {
                return Err(RetryError::Canceled);
            }
            self.counters.inner.attempts.fetch_add(1, Ordering::Relaxed);
            match self.factory.create(ctx).await {
                Ok(conn) => return Ok(Some(conn)),
                Err(e) => {
                    warn!(phase = "gradual", attempt, error = %e, "retry attempt failed");
                    *last_error = Some(e);
                }
            }
            if attempt + 1 < self.config.gradual_attempts {
                if self.sleep_or_cancel(ctx, interval).await {
                    return Err(RetryError::Canceled);
                }
                interval = std::cmp::min(interval * 2, self.config.max_gradual_interval);
            }
        }
        Ok(None)
    }

    /// Sleeps for `dur` unless `ctx` is canceled first. Returns `true` if
    /// cancellation won the race.
    async fn sleep_or_cancel(&self, ctx: &CancellationToken, dur: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(dur) => false,
            _ = ctx.cancelled() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    #[derive(Debug)]
    struct DummyError(String);

    impl std::fmt::Display for DummyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    struct FlakyFactory {
        calls: AtomicU32,
        fail_until: u32,
    }

    #[async_trait]
    impl Factory<u32> for FlakyFactory {
        type Error = DummyError;

        async fn create(&self, _ctx: &CancellationToken) -> std::result::Result<u32, DummyError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err(DummyError(format!("attempt {n} failed")))
            } else {
                Ok(n)
            }
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            immediate_attempts: 3,
            immediate_interval: Duration::from_millis(1),
            gradual_attempts: 5,
            gradual_interval: Duration::from_millis(1),
            max_gradual_interval: Duration::from_millis(5),
            persistent_enabled: false,
            persistent_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_in_immediate_phase_without_extra_attempts() {
        let factory = Arc::new(FlakyFactory {
            calls: AtomicU32::new(0),
            fail_until: 1,
        });
        let manager = RetryManager::new(fast_config(), factory);
        let ctx = CancellationToken::new();

        let result = manager.get(&ctx).await;

        assert!(result.is_ok());
        assert_eq!(manager.counters().attempts(), 2);
        assert_eq!(manager.counters().successes(), 1);
        assert_eq!(manager.counters().failures(), 0);
    }

    #[tokio::test]
    async fn falls_through_to_gradual_phase_on_immediate_exhaustion() {
        // Fails the 3 immediate attempts, succeeds on the 4th (first gradual attempt).
        let factory = Arc::new(FlakyFactory {
            calls: AtomicU32::new(0),
            fail_until: 3,
        });
        let manager = RetryManager::new(fast_config(), factory);
        let ctx = CancellationToken::new();

        let result = manager.get(&ctx).await;

        assert!(result.is_ok());
        assert_eq!(manager.counters().attempts(), 4);
        assert_eq!(manager.counters().failures(), 0);
    }

    #[tokio::test]
    async fn persistent_phase_eventually_succeeds() {
        // Immediate (3) + Gradual (5) = 8 failing attempts, 9th (1st persistent) fails,
        // 10th (2nd persistent) succeeds: 9 total failures then success on attempt 10.
        let factory = Arc::new(FlakyFactory {
            calls: AtomicU32::new(0),
            fail_until: 9,
        });
        let mut config = fast_config();
        config.persistent_enabled = true;
        let manager = RetryManager::new(config, factory);
        let ctx = CancellationToken::new();

        let result = manager.get(&ctx).await;

        assert!(result.is_ok());
        assert_eq!(manager.counters().attempts(), 10);
        assert_eq!(manager.counters().failures(), 0);
        assert_eq!(manager.counters().successes(), 1);
    }

    #[tokio::test]
    async fn exhausts_all_phases_and_reports_max_retries_exceeded() {
        let factory = Arc::new(FlakyFactory {
            calls: AtomicU32::new(0),
            fail_until: u32::MAX,
        });
        let manager = RetryManager::new(fast_config(), factory);
        let ctx = CancellationToken::new();

        let result = manager.get(&ctx).await;

        assert!(matches!(result, Err(RetryError::MaxRetriesExceeded(Some(_)))));
        assert_eq!(manager.counters().attempts(), 8);
        assert_eq!(manager.counters().failures(), 1);
        assert_eq!(manager.counters().successes(), 0);
    }

    #[tokio::test]
    async fn cancellation_wins_mid_backoff() {
        let factory = Arc::new(FlakyFactory {
            calls: AtomicU32::new(0),
            fail_until: u32::MAX,
        });
        let mut config = fast_config();
        config.immediate_interval = Duration::from_secs(10);
        let manager = RetryManager::new(config, factory);
        let ctx = CancellationToken::new();
        ctx.cancel();

        let result = manager.get(&ctx).await;

        assert!(matches!(result, Err(RetryError::Canceled)));
    }
}
