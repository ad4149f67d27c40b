//! Quota windows, limits and the decisions made against them.

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Default window length: 15 minutes.
pub const DEFAULT_WINDOW_MS: u64 = 15 * 60 * 1000;
/// Default number of admitted requests per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 100;

/// One client's quota state for one window period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Requests admitted so far in this window
    pub count: u32,
    /// Epoch milliseconds at which this window expires
    pub reset_time: u64,
}

impl Window {
    /// Open a window with its first admitted request.
    pub fn open(reset_time: u64) -> Self {
        Self {
            count: 1,
            reset_time,
        }
    }

    /// Whether the window has expired at `now`.
    ///
    /// Strict comparison: the reset instant itself still belongs to this window.
    pub fn is_expired(&self, now: u64) -> bool {
        self.reset_time < now
    }
}

/// Window length and admission limit for a protected endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests admitted per window
    pub max_requests: u32,
}

impl QuotaConfig {
    /// Create a validated quota configuration.
    pub fn new(window_ms: u64, max_requests: u32) -> Result<Self> {
        let config = Self {
            window_ms,
            max_requests,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that both the window and the limit are positive.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(GateError::Config("window_ms must be positive".to_string()));
        }
        if self.max_requests == 0 {
            return Err(GateError::Config(
                "max_requests must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

/// The verdict for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests still admissible in the current window
    pub remaining: u32,
    /// Epoch milliseconds at which the current window resets
    pub reset_time: u64,
    /// The limit this decision was evaluated against
    pub limit: u32,
}

impl Decision {
    /// Whole seconds until reset, rounded up.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset_time.saturating_sub(now).div_ceil(1000)
    }
}
