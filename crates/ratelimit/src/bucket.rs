use std::time::Instant;

use meridian_core::Clock;

/// Rate (tokens/sec), burst (max capacity), current token count, and
/// the last-refill timestamp (§3 Token Bucket). Invariant: `0 <= tokens
/// <= burst`; tokens are monotonically non-decreasing between
/// consumption points.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate: f64, burst: f64, now: Instant) -> Self {
        Self {
            rate,
            burst,
            tokens: burst,
            last_refill: now,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn burst(&self) -> f64 {
        self.burst
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_update(&self) -> Instant {
        self.last_refill
    }

    pub fn set_rate(&mut self, rate: f64, burst: f64) {
        self.rate = rate;
        self.burst = burst;
        self.tokens = self.tokens.min(burst);
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
            self.last_refill = now;
        }
    }

    /// Refill, then deduct `n` tokens iff at least `n` are available.
    /// Returns whether the deduction happened.
    pub fn take(&mut self, n: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    pub fn clock_tick(&mut self, now: Instant) {
        self.refill(now);
    }
}

/// Convenience constructor taking a `Clock` rather than a raw `Instant`,
/// matching how the limiter threads its injected clock through.
pub fn new_bucket(rate: f64, burst: f64, clock: &dyn Clock) -> TokenBucket {
    TokenBucket::new(rate, burst, clock.now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_full() {
        let b = TokenBucket::new(10.0, 5.0, Instant::now());
        assert_eq!(b.tokens(), 5.0);
    }

    #[test]
    fn take_deducts_exactly_n() {
        let mut b = TokenBucket::new(10.0, 5.0, Instant::now());
        let now = b.last_update();
        assert!(b.take(3.0, now));
        assert_eq!(b.tokens(), 2.0);
    }

    #[test]
    fn take_fails_without_deduction_when_insufficient() {
        let mut b = TokenBucket::new(10.0, 5.0, Instant::now());
        let now = b.last_update();
        assert!(!b.take(6.0, now));
        assert_eq!(b.tokens(), 5.0);
    }

    #[test]
    fn refill_caps_at_burst() {
        let start = Instant::now();
        let mut b = TokenBucket::new(10.0, 5.0, start);
        assert!(b.take(5.0, start));
        let later = start + Duration::from_secs(10);
        assert!(b.take(0.0, later));
        assert_eq!(b.tokens(), 5.0);
    }

    #[test]
    fn tokens_never_negative_or_over_burst() {
        let start = Instant::now();
        let mut b = TokenBucket::new(1.0, 2.0, start);
        for i in 0..20 {
            let now = start + Duration::from_millis(i * 50);
            b.take(10.0, now);
            assert!(b.tokens() >= 0.0 && b.tokens() <= 2.0);
        }
    }
}
