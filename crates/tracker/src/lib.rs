//! Connection Tracker (spec §4.7)
//!
//! Per-remote-address byte counters plus process-wide aggregates.
//! `record_sent`/`record_received` each take the *delta* for their own
//! direction only, so two independent callers — one per direction of a
//! duplex session — can report concurrently without either clobbering
//! the other's baseline.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use meridian_core::Clock;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerStats {
    pub active_connections: u64,
    pub peak_connections: u64,
    pub completed_connections: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub average_connection_duration: Duration,
}

struct ConnRecord {
    started_at: Instant,
}

struct Aggregates {
    active: u64,
    peak: u64,
    completed: u64,
    total_bytes_sent: u64,
    total_bytes_received: u64,
    total_duration: Duration,
}

impl Aggregates {
    fn new() -> Self {
        Self {
            active: 0,
            peak: 0,
            completed: 0,
            total_bytes_sent: 0,
            total_bytes_received: 0,
            total_duration: Duration::ZERO,
        }
    }
}

/// Tracks per-connection counters and the process-wide aggregates
/// derived from them (§3 Connection Tracker).
pub struct ConnectionTracker {
    clock: Arc<dyn Clock>,
    connections: RwLock<HashMap<String, ConnRecord>>,
    aggregates: RwLock<Aggregates>,
}

impl ConnectionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            connections: RwLock::new(HashMap::new()),
            aggregates: RwLock::new(Aggregates::new()),
        }
    }

    /// Begin tracking a connection identified by `key` (typically the
    /// remote address). Peak is updated as a monotonic high-water mark.
    pub fn track(&self, key: &str) {
        let now = self.clock.now();
        self.connections
            .write()
            .insert(key.to_string(), ConnRecord { started_at: now });
        let mut agg = self.aggregates.write();
        agg.active += 1;
        agg.peak = agg.peak.max(agg.active);
    }

    /// Stop tracking `key`, folding its duration into the average.
    pub fn untrack(&self, key: &str) {
        let now = self.clock.now();
        let record = self.connections.write().remove(key);
        if let Some(record) = record {
            let mut agg = self.aggregates.write();
            agg.active = agg.active.saturating_sub(1);
            agg.completed += 1;
            agg.total_duration += now.saturating_duration_since(record.started_at);
        }
    }

    /// Record `delta` more bytes sent to `key`. Independent of
    /// `record_received`, so the two directions of a duplex session can
    /// call in from separate tasks without interfering.
    pub fn record_sent(&self, key: &str, delta: u64) {
        if !self.connections.read().contains_key(key) {
            return;
        }
        self.aggregates.write().total_bytes_sent += delta;
    }

    /// Record `delta` more bytes received from `key`. See `record_sent`.
    pub fn record_received(&self, key: &str, delta: u64) {
        if !self.connections.read().contains_key(key) {
            return;
        }
        self.aggregates.write().total_bytes_received += delta;
    }

    pub fn stats(&self) -> TrackerStats {
        let agg = self.aggregates.read();
        let average = if agg.completed > 0 {
            agg.total_duration / agg.completed as u32
        } else {
            Duration::ZERO
        };
        TrackerStats {
            active_connections: agg.active,
            peak_connections: agg.peak,
            completed_connections: agg.completed,
            total_bytes_sent: agg.total_bytes_sent,
            total_bytes_received: agg.total_bytes_received,
            average_connection_duration: average,
        }
    }

    /// Reset everything except `active_connections` and `peak_connections`.
    pub fn reset_stats(&self) {
        let mut agg = self.aggregates.write();
        agg.completed = 0;
        agg.total_bytes_sent = 0;
        agg.total_bytes_received = 0;
        agg.total_duration = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::MockClock;
    use std::time::Duration as StdDuration;

    fn tracker() -> (ConnectionTracker, MockClock) {
        let clock = MockClock::new();
        (ConnectionTracker::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn peak_is_monotonic_high_water_mark() {
        let (t, _clock) = tracker();
        t.track("a");
        t.track("b");
        t.untrack("a");
        t.track("c");
        t.track("d");
        let stats = t.stats();
        assert_eq!(stats.active_connections, 3);
        assert_eq!(stats.peak_connections, 3);

        t.untrack("b");
        t.untrack("c");
        t.untrack("d");
        let stats = t.stats();
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.peak_connections, 3, "peak must never decrease on untrack");
    }

    #[test]
    fn record_sent_and_received_accumulate_independently() {
        let (t, _clock) = tracker();
        t.track("a");
        t.record_sent("a", 100);
        t.record_sent("a", 150);
        t.record_received("a", 50);
        t.record_received("a", 30);
        let stats = t.stats();
        assert_eq!(stats.total_bytes_sent, 250);
        assert_eq!(stats.total_bytes_received, 80);
    }

    #[test]
    fn concurrent_directions_do_not_clobber_each_other() {
        // One caller reports only `sent`, the other only `received`, as
        // the two halves of a duplex session do — neither call carries a
        // dummy value for the direction it doesn't own.
        let (t, _clock) = tracker();
        t.track("a");
        t.record_sent("a", 100);
        t.record_received("a", 10);
        t.record_sent("a", 50);
        t.record_received("a", 20);
        let stats = t.stats();
        assert_eq!(stats.total_bytes_sent, 150);
        assert_eq!(stats.total_bytes_received, 30);
    }

    #[test]
    fn two_connections_bytes_are_additive() {
        let (t, _clock) = tracker();
        t.track("a");
        t.track("b");
        t.record_sent("a", 100);
        t.record_received("a", 10);
        t.record_sent("b", 40);
        t.record_received("b", 5);
        let stats = t.stats();
        assert_eq!(stats.total_bytes_sent, 140);
        assert_eq!(stats.total_bytes_received, 15);
    }

    #[test]
    fn average_duration_divides_by_completed_count() {
        let (t, clock) = tracker();
        t.track("a");
        clock.advance(StdDuration::from_secs(10));
        t.untrack("a");

        t.track("b");
        clock.advance(StdDuration::from_secs(20));
        t.untrack("b");

        let stats = t.stats();
        assert_eq!(stats.completed_connections, 2);
        assert_eq!(stats.average_connection_duration, StdDuration::from_secs(15));
    }

    #[test]
    fn reset_preserves_active_and_peak() {
        let (t, _clock) = tracker();
        t.track("a");
        t.track("b");
        t.record_sent("a", 500);
        t.record_received("a", 500);
        t.untrack("a");

        t.reset_stats();
        let stats = t.stats();
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.peak_connections, 2);
        assert_eq!(stats.total_bytes_sent, 0);
        assert_eq!(stats.completed_connections, 0);
    }
}
