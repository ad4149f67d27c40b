//! Opportunistic eviction of expired windows.

use rand::Rng;
use tracing::debug;

use super::store::WindowStore;

/// Default chance that a check triggers a sweep (1 in 1000).
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.001;

/// Decides when to sweep the window store, and performs the sweep.
///
/// Sweeping is best-effort: nothing in the engine relies on it having run,
/// since expired windows are treated as absent when read.
#[derive(Debug, Clone, Copy)]
pub struct Sweeper {
    probability: f64,
}

impl Sweeper {
    /// Create a sweeper that triggers with the given probability per check.
    ///
    /// Values outside `[0, 1]` are clamped; NaN disables sweeping.
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    /// A sweeper that never triggers on its own.
    pub fn never() -> Self {
        Self::new(0.0)
    }

    /// A sweeper that triggers on every check.
    pub fn always() -> Self {
        Self::new(1.0)
    }

    /// Get the trigger probability.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Roll the dice for this check.
    pub fn should_sweep(&self) -> bool {
        rand::thread_rng().gen_bool(self.probability)
    }

    /// Remove every window whose reset time is strictly before `now`.
    pub fn sweep(&self, store: &WindowStore, now: u64) -> usize {
        let removed = store.remove_expired(now);
        debug!(
            removed = removed,
            remaining = store.len(),
            "Swept expired quota windows"
        );
        removed
    }
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_PROBABILITY)
    }
}
