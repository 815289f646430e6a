use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use meridian_core::Clock;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bucket::TokenBucket;
use crate::error::{RateLimitError, Result};
use crate::metrics::{RateLimitMetrics, RateLimitMetricsInner};

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub default_rate: f64,
    pub default_burst: f64,
    /// Buckets whose last-update age exceeds this are reaped by the
    /// cleanup task (§4.2: "24h, configurable").
    pub idle_cleanup_ttl: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            default_rate: 100.0,
            default_burst: 200.0,
            idle_cleanup_ttl: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Mapping from identity string to Token Bucket plus a default (rate,
/// burst) (§3 Rate Limiter, §4.2).
pub struct RateLimiter {
    buckets: Arc<DashMap<String, Mutex<TokenBucket>>>,
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    metrics: Arc<RateLimitMetricsInner>,
    cleanup_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let limiter = Arc::new(Self {
            buckets: Arc::new(DashMap::new()),
            config,
            clock,
            metrics: Arc::new(RateLimitMetricsInner::default()),
            cleanup_handle: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });
        limiter.clone().spawn_cleanup_task();
        limiter
    }

    fn spawn_cleanup_task(self: Arc<Self>) {
        let buckets = self.buckets.clone();
        let metrics = self.metrics.clone();
        let interval = self.config.cleanup_interval;
        let ttl = self.config.idle_cleanup_ttl;
        let clock = self.clock.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = clock.now();
                        let mut reaped = 0u64;
                        buckets.retain(|id, bucket| {
                            let age = now.saturating_duration_since(bucket.lock().last_update());
                            let keep = age <= ttl;
                            if !keep {
                                debug!(identity = %id, "reaping idle rate-limit bucket");
                                reaped += 1;
                            }
                            keep
                        });
                        if reaped > 0 {
                            metrics.buckets_reaped.fetch_add(reaped, std::sync::atomic::Ordering::Relaxed);
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
        *self.cleanup_handle.lock() = Some(handle);
    }

    fn get_or_create(&self, id: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<TokenBucket>> {
        if !self.buckets.contains_key(id) {
            self.buckets.entry(id.to_string()).or_insert_with(|| {
                Mutex::new(TokenBucket::new(
                    self.config.default_rate,
                    self.config.default_burst,
                    self.clock.now(),
                ))
            });
        }
        self.buckets.get(id).expect("just inserted")
    }

    pub fn allow(&self, id: &str) -> bool {
        self.allow_n(id, 1.0)
    }

    pub fn allow_n(&self, id: &str, n: f64) -> bool {
        let entry = self.get_or_create(id);
        let now = self.clock.now();
        let allowed = entry.lock().take(n, now);
        self.metrics.record(allowed);
        allowed
    }

    pub fn set_rate(&self, id: &str, rate: f64, burst: f64) -> Result<()> {
        if rate <= 0.0 || burst <= 0.0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "rate and burst must be positive, got rate={rate} burst={burst}"
            )));
        }
        let entry = self.get_or_create(id);
        entry.lock().set_rate(rate, burst);
        Ok(())
    }

    pub fn get_rate(&self, id: &str) -> (f64, f64) {
        let entry = self.get_or_create(id);
        let bucket = entry.lock();
        (bucket.rate(), bucket.burst())
    }

    pub fn remove(&self, id: &str) {
        self.buckets.remove(id);
    }

    /// Poll until `n` tokens are available, honoring cancellation. Polls
    /// in intervals of `1 / default_rate` per §4.2.
    pub async fn wait_n(&self, ctx: &CancellationToken, id: &str, n: f64) -> Result<()> {
        let poll_interval = Duration::from_secs_f64(1.0 / self.config.default_rate.max(1.0));
        loop {
            if ctx.is_cancelled() {
                return Err(RateLimitError::Canceled);
            }
            if self.allow_n(id, n) {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = ctx.cancelled() => return Err(RateLimitError::Canceled),
            }
        }
    }

    pub fn metrics(&self) -> RateLimitMetrics {
        self.metrics.snapshot(self.buckets.len())
    }

    /// Stop the background cleanup task. Idempotent.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.cleanup_handle.lock().take() {
            let _ = handle.await;
        }
    }
}
