use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters exposed by `RateLimiter::metrics()`.
#[derive(Debug, Default)]
pub struct RateLimitMetricsInner {
    pub allowed: AtomicU64,
    pub denied: AtomicU64,
    pub buckets_reaped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitMetrics {
    pub allowed: u64,
    pub denied: u64,
    pub active_buckets: usize,
    pub buckets_reaped: u64,
}

impl RateLimitMetricsInner {
    pub fn record(&self, allowed: bool) {
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, active_buckets: usize) -> RateLimitMetrics {
        RateLimitMetrics {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            active_buckets,
            buckets_reaped: self.buckets_reaped.load(Ordering::Relaxed),
        }
    }
}
