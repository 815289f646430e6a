use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Composition-root-injected time source (§9: "pass a context value
/// carrying ... clock; inject at composition root; forbid package-level
/// singletons"). The rate limiter, circuit breaker, and pool idle-reaper
/// all take a `Clock` rather than calling `Instant::now()` directly so
/// tests can advance time deterministically instead of sleeping.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// The real clock, backed by the monotonic system clock.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose `now()` is `base + offset`, where `offset` is advanced
/// explicitly by the test. `base` is captured once at construction so
/// every `MockClock` produces valid, comparable `Instant`s.
#[derive(Debug, Clone)]
pub struct MockClock {
    base: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.offset_nanos
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_monotonically() {
        let clock = MockClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(1));
        let t1 = clock.now();
        assert!(t1 >= t0 + Duration::from_secs(1));
    }

    #[test]
    fn mock_clock_shared_across_clones_sees_same_advance() {
        let clock = MockClock::new();
        let clone = clock.clone();
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), clone.now());
    }
}
