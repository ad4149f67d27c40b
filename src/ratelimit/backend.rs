//! Quota backend trait for abstracting where window state lives.

use super::window::{Decision, QuotaConfig};

/// Trait for quota backend implementations.
///
/// The HTTP layer talks to this trait rather than to [`QuotaEngine`]
/// directly, so a shared store could stand in for the process-local one.
/// Such a backend would have to decide whether an unreachable store fails
/// open or closed; the local engine cannot become unavailable.
///
/// [`QuotaEngine`]: super::QuotaEngine
pub trait QuotaBackend: Send + Sync {
    /// Evaluate and record one request for `key` under `config`.
    fn check(&self, key: &str, config: &QuotaConfig) -> Decision;

    /// The backend's current time in epoch milliseconds.
    fn now_millis(&self) -> u64;
}
