use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct MemoryManagerConfig {
    /// Process-wide budget in bytes.
    pub budget: u64,
    /// Ratio of `budget` above which pressure is no longer `None`.
    pub soft_limit_ratio: f64,
    /// Ratio of `budget` at which a synchronous cleanup pass is forced.
    pub force_cleanup_ratio: f64,
    pub monitor_interval: Duration,
}

impl Default for MemoryManagerConfig {
    fn default() -> Self {
        Self {
            budget: 256 * 1024 * 1024,
            soft_limit_ratio: 0.7,
            force_cleanup_ratio: 0.95,
            monitor_interval: Duration::from_secs(5),
        }
    }
}

type CleanupCallback = Box<dyn Fn() + Send + Sync>;

/// Process-wide memory budget and pressure reporting (§3 Memory
/// Manager, §4.8). The monitor task and its cleanup callbacks are the
/// one permitted package-level-singleton-shaped lifecycle in this
/// design: `start_monitor` / `stop` bookend the process.
pub struct MemoryManager {
    config: MemoryManagerConfig,
    current: AtomicU64,
    peak: AtomicU64,
    callbacks: Mutex<Vec<CleanupCallback>>,
    monitor_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    stop_tx: Mutex<Option<tokio::sync::watch::Sender<bool>>>,
}

impl MemoryManager {
    pub fn new(config: MemoryManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            current: AtomicU64::new(0),
            peak: AtomicU64::new(0),
            callbacks: Mutex::new(Vec::new()),
            monitor_handle: Mutex::new(None),
            stop_tx: Mutex::new(None),
        })
    }

    /// Atomically admit `n` bytes against the budget. Either raises
    /// `current` by `n` and returns `true`, or leaves `current`
    /// unchanged and returns `false`.
    pub fn check_and_reserve(&self, n: u64) -> bool {
        let mut observed = self.current.load(Ordering::Acquire);
        loop {
            let next = observed + n;
            if next > self.config.budget {
                return false;
            }
            match self.current.compare_exchange_weak(
                observed,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(next, Ordering::AcqRel);
                    return true;
                }
                Err(actual) => observed = actual,
            }
        }
    }

    /// Release `n` bytes back to the budget, saturating at zero.
    pub fn release(&self, n: u64) {
        let mut observed = self.current.load(Ordering::Acquire);
        loop {
            let next = observed.saturating_sub(n);
            match self.current.compare_exchange_weak(
                observed,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => observed = actual,
            }
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Acquire)
    }

    pub fn budget(&self) -> u64 {
        self.config.budget
    }

    pub fn register_cleanup(&self, f: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().push(Box::new(f));
    }

    pub fn pressure(&self) -> PressureLevel {
        let ratio = self.current() as f64 / self.config.budget.max(1) as f64;
        if ratio >= self.config.force_cleanup_ratio {
            PressureLevel::Critical
        } else if ratio >= self.config.soft_limit_ratio {
            PressureLevel::High
        } else if ratio >= self.config.soft_limit_ratio * 0.75 {
            PressureLevel::Medium
        } else if ratio >= self.config.soft_limit_ratio * 0.5 {
            PressureLevel::Low
        } else {
            PressureLevel::None
        }
    }

    fn run_cleanup_callbacks(&self) {
        for cb in self.callbacks.lock().iter() {
            cb();
        }
    }

    /// Spawn the periodic monitor task. Idempotent: a second call is a
    /// no-op if one is already running.
    pub fn start_monitor(self: &Arc<Self>) {
        if self.monitor_handle.lock().is_some() {
            return;
        }
        let (tx, mut rx) = tokio::sync::watch::channel(false);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.monitor_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let level = this.pressure();
                        if level >= PressureLevel::Medium {
                            warn!(?level, current = this.current(), budget = this.config.budget, "memory pressure");
                            this.run_cleanup_callbacks();
                        }
                        if level == PressureLevel::Critical {
                            info!("forcing synchronous cleanup pass at critical pressure");
                            this.run_cleanup_callbacks();
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });
        *self.monitor_handle.lock() = Some(handle);
        *self.stop_tx.lock() = Some(tx);
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.monitor_handle.lock().take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(budget: u64) -> Arc<MemoryManager> {
        MemoryManager::new(MemoryManagerConfig {
            budget,
            ..Default::default()
        })
    }

    #[test]
    fn reserve_then_release_returns_to_prior_value() {
        let mgr = manager(1024);
        assert!(mgr.check_and_reserve(256));
        assert_eq!(mgr.current(), 256);
        mgr.release(256);
        assert_eq!(mgr.current(), 0);
    }

    #[test]
    fn reserve_fails_and_leaves_current_unchanged_over_budget() {
        let mgr = manager(100);
        assert!(mgr.check_and_reserve(80));
        assert!(!mgr.check_and_reserve(30));
        assert_eq!(mgr.current(), 80);
    }

    #[test]
    fn peak_is_monotonic_high_water_mark() {
        let mgr = manager(1000);
        assert!(mgr.check_and_reserve(500));
        assert!(mgr.check_and_reserve(300));
        assert_eq!(mgr.peak(), 800);
        mgr.release(400);
        assert_eq!(mgr.peak(), 800, "peak must not decrease on release");
    }

    #[test]
    fn release_saturates_at_zero() {
        let mgr = manager(1000);
        assert!(mgr.check_and_reserve(100));
        mgr.release(500);
        assert_eq!(mgr.current(), 0);
    }

    #[test]
    fn pressure_rises_with_usage() {
        let mgr = manager(1000);
        assert_eq!(mgr.pressure(), PressureLevel::None);
        assert!(mgr.check_and_reserve(960));
        assert_eq!(mgr.pressure(), PressureLevel::Critical);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_invokes_callback_under_pressure() {
        let mgr = manager(100);
        mgr.start_monitor();
        let invoked = Arc::new(AtomicU64::new(0));
        let invoked2 = invoked.clone();
        mgr.register_cleanup(move || {
            invoked2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(mgr.check_and_reserve(90));
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert!(invoked.load(Ordering::SeqCst) > 0);
        mgr.stop().await;
    }
}
