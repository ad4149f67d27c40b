//! Core fixed-window quota engine.

use std::sync::Arc;
use tracing::{debug, trace};

use super::backend::QuotaBackend;
use super::clock::{Clock, SystemClock};
use super::store::WindowStore;
use super::sweeper::Sweeper;
use super::window::{Decision, QuotaConfig, Window};

/// Fixed-window counter anchored at each key's first arrival.
///
/// The engine exclusively owns its [`WindowStore`]; every mutation happens
/// inside [`QuotaEngine::check`] (or [`QuotaEngine::admit_until`]) under the
/// key's lock, so concurrent first arrivals open exactly one window and the
/// admitted count never passes the limit.
///
/// State is local to this process. Several instances behind one deployment
/// each keep their own quotas.
pub struct QuotaEngine {
    /// Windows indexed by identity key
    store: WindowStore,
    /// Opportunistic cleanup of expired windows
    sweeper: Sweeper,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl QuotaEngine {
    /// Create an engine on the system clock with the default sweeper.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an engine on the given clock with the default sweeper.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: WindowStore::new(),
            sweeper: Sweeper::default(),
            clock,
        }
    }

    /// Replace the sweeper.
    pub fn with_sweeper(mut self, sweeper: Sweeper) -> Self {
        self.sweeper = sweeper;
        self
    }

    /// Check and record one request for `key`.
    ///
    /// A fresh window lasts `config.window_ms` from this call.
    pub fn check(&self, key: &str, config: &QuotaConfig) -> Decision {
        let now = self.clock.now_millis();
        self.admit(key, config.max_requests, now, now.saturating_add(config.window_ms))
    }

    /// Check and record one request for `key`, opening any fresh window so
    /// that it resets at `reset_time`.
    ///
    /// Used for windows aligned to calendar boundaries rather than to the
    /// first arrival.
    pub fn admit_until(&self, key: &str, max_requests: u32, reset_time: u64) -> Decision {
        let now = self.clock.now_millis();
        self.admit(key, max_requests, now, reset_time)
    }

    fn admit(&self, key: &str, max_requests: u32, now: u64, fresh_reset: u64) -> Decision {
        // Sweep before taking the key's lock; retain walks every shard.
        if self.sweeper.should_sweep() {
            self.sweeper.sweep(&self.store, now);
        }

        trace!(key = %key, max_requests = max_requests, now = now, "Checking quota");

        self.store.with_window(key, |slot| {
            match slot.as_mut().filter(|w| !w.is_expired(now)) {
                Some(window) if window.count >= max_requests => {
                    debug!(
                        key = %key,
                        count = window.count,
                        reset_time = window.reset_time,
                        "Quota exceeded"
                    );
                    Decision {
                        allowed: false,
                        remaining: 0,
                        reset_time: window.reset_time,
                        limit: max_requests,
                    }
                }
                Some(window) => {
                    window.count += 1;
                    Decision {
                        allowed: true,
                        remaining: max_requests - window.count,
                        reset_time: window.reset_time,
                        limit: max_requests,
                    }
                }
                None if max_requests == 0 => Decision {
                    allowed: false,
                    remaining: 0,
                    reset_time: fresh_reset,
                    limit: 0,
                },
                None => {
                    debug!(key = %key, reset_time = fresh_reset, "Opening quota window");
                    *slot = Some(Window::open(fresh_reset));
                    Decision {
                        allowed: true,
                        remaining: max_requests.saturating_sub(1),
                        reset_time: fresh_reset,
                        limit: max_requests,
                    }
                }
            }
        })
    }

    /// Requests admitted so far in the live window for `key`.
    ///
    /// Zero when the key has no window or its window has expired.
    pub fn usage(&self, key: &str) -> u32 {
        let now = self.clock.now_millis();
        self.store
            .get(key)
            .filter(|w| !w.is_expired(now))
            .map_or(0, |w| w.count)
    }

    /// Raw stored window for `key`, which may be expired and not yet swept.
    pub fn window(&self, key: &str) -> Option<Window> {
        self.store.get(key)
    }

    /// Run a sweep now, regardless of the sweeper's probability.
    pub fn sweep(&self) -> usize {
        self.sweeper.sweep(&self.store, self.clock.now_millis())
    }

    /// Clear all windows.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Get the number of stored windows.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no windows are stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for QuotaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaBackend for QuotaEngine {
    fn check(&self, key: &str, config: &QuotaConfig) -> Decision {
        QuotaEngine::check(self, key, config)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::time::Duration;

    const START: u64 = 1_700_000_000_000;

    fn engine() -> (QuotaEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let engine = QuotaEngine::with_clock(clock.clone()).with_sweeper(Sweeper::never());
        (engine, clock)
    }

    fn quota(max_requests: u32, window_ms: u64) -> QuotaConfig {
        QuotaConfig::new(window_ms, max_requests).unwrap()
    }

    #[test]
    fn test_admits_up_to_limit_then_rejects() {
        let (engine, _clock) = engine();
        let config = quota(3, 1_000);

        let decisions: Vec<Decision> = (0..4).map(|_| engine.check("k", &config)).collect();

        assert!(decisions[0].allowed);
        assert_eq!(decisions[0].remaining, 2);
        assert!(decisions[1].allowed);
        assert_eq!(decisions[1].remaining, 1);
        assert!(decisions[2].allowed);
        assert_eq!(decisions[2].remaining, 0);
        assert!(!decisions[3].allowed);
        assert_eq!(decisions[3].remaining, 0);

        // All four are bound to the window opened by the first call.
        for decision in &decisions {
            assert_eq!(decision.reset_time, START + 1_000);
            assert_eq!(decision.limit, 3);
        }
    }

    #[test]
    fn test_new_window_after_expiry() {
        let (engine, clock) = engine();
        let config = quota(3, 1_000);

        for _ in 0..4 {
            engine.check("k", &config);
        }

        clock.advance(Duration::from_millis(1_500));
        let decision = engine.check("k", &config);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_time, START + 1_500 + 1_000);
        assert_eq!(engine.window("k").map(|w| w.count), Some(1));
    }

    #[test]
    fn test_reset_instant_belongs_to_old_window() {
        let (engine, clock) = engine();
        let config = quota(1, 1_000);

        assert!(engine.check("k", &config).allowed);

        clock.set(START + 1_000);
        let at_reset = engine.check("k", &config);
        assert!(!at_reset.allowed);
        assert_eq!(at_reset.reset_time, START + 1_000);

        clock.set(START + 1_001);
        let after_reset = engine.check("k", &config);
        assert!(after_reset.allowed);
        assert_eq!(after_reset.reset_time, START + 1_001 + 1_000);
    }

    #[test]
    fn test_keys_are_independent() {
        let (engine, _clock) = engine();
        let config = quota(2, 1_000);

        engine.check("k2", &config);
        let before = engine.window("k2");

        for _ in 0..5 {
            engine.check("k1", &config);
        }

        assert_eq!(engine.window("k2"), before);
        assert!(engine.check("k2", &config).allowed);
        assert!(!engine.check("k1", &config).allowed);
    }

    #[test]
    fn test_rejection_is_idempotent() {
        let (engine, clock) = engine();
        let config = quota(2, 10_000);

        engine.check("k", &config);
        engine.check("k", &config);
        let stored = engine.window("k");

        for step in 0..20 {
            clock.advance(Duration::from_millis(100));
            let decision = engine.check("k", &config);
            assert!(!decision.allowed, "call {} should be rejected", step);
            assert_eq!(decision.remaining, 0);
            assert_eq!(decision.reset_time, START + 10_000);
        }

        assert_eq!(engine.window("k"), stored);
    }

    #[test]
    fn test_expired_window_is_ignored_without_sweep() {
        let (engine, clock) = engine();
        let config = quota(1, 1_000);

        engine.check("k", &config);
        clock.advance(Duration::from_secs(5));

        // Still stored, but logically absent.
        assert!(engine.window("k").is_some());
        assert_eq!(engine.usage("k"), 0);
        assert!(engine.check("k", &config).allowed);
    }

    #[test]
    fn test_sweep_never_removes_live_windows() {
        let (engine, clock) = engine();

        engine.check("short", &quota(5, 1_000));
        engine.check("long", &quota(5, 60_000));
        clock.advance(Duration::from_millis(1_001));

        assert_eq!(engine.sweep(), 1);
        assert!(engine.window("short").is_none());
        assert!(engine.window("long").is_some());
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_sweep_triggered_by_check() {
        let clock = Arc::new(ManualClock::new(START));
        let engine = QuotaEngine::with_clock(clock.clone()).with_sweeper(Sweeper::always());
        let config = quota(5, 1_000);

        engine.check("stale", &config);
        clock.advance(Duration::from_secs(2));
        engine.check("fresh", &config);

        assert!(engine.window("stale").is_none());
        assert!(engine.window("fresh").is_some());
    }

    #[test]
    fn test_admit_until_uses_given_reset() {
        let (engine, _clock) = engine();

        let first = engine.admit_until("day", 2, START + 86_400_000);
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_time, START + 86_400_000);

        // A live window keeps its reset even if a different one is offered.
        let second = engine.admit_until("day", 2, START + 1);
        assert!(second.allowed);
        assert_eq!(second.reset_time, START + 86_400_000);

        assert!(!engine.admit_until("day", 2, START + 1).allowed);
        assert_eq!(engine.usage("day"), 2);
    }

    #[test]
    fn test_zero_limit_never_admits() {
        let (engine, _clock) = engine();

        let decision = engine.admit_until("none", 0, START + 1_000);
        assert!(!decision.allowed);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_clear_counters() {
        let (engine, _clock) = engine();
        engine.check("k", &quota(1, 1_000));
        assert_eq!(engine.len(), 1);

        engine.clear();
        assert!(engine.is_empty());
    }

    #[test]
    fn test_concurrent_first_arrivals_across_threads() {
        let (engine, _clock) = engine();
        let config = quota(10, 60_000);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|_| {
                    scope.spawn(|| {
                        (0..8)
                            .filter(|_| engine.check("hot", &config).allowed)
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 10);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.usage("hot"), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_arrivals_across_tasks() {
        let (engine, _clock) = engine();
        let engine = Arc::new(engine);
        let config = quota(25, 60_000);

        let tasks = (0..200).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.check("hot", &config).allowed })
        });
        let results = futures::future::join_all(tasks).await;

        let admitted = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
        assert_eq!(admitted, 25);
        assert_eq!(engine.window("hot").map(|w| w.count), Some(25));
    }
}
