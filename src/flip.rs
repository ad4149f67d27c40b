//! Daily flip quota.
//!
//! A flip negates the running aura total. Flips are limited per UTC
//! calendar day, using the same fixed-window engine as request quotas with
//! windows that end at midnight instead of a fixed length after first use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::ratelimit::{Clock, QuotaEngine, SystemClock};

/// Default number of flips allowed per day.
pub const DEFAULT_MAX_FLIPS_PER_DAY: u32 = 1;

/// Flip quota configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlipConfig {
    /// Flips allowed per UTC calendar day
    #[serde(default = "default_max_flips_per_day")]
    pub max_flips_per_day: u32,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            max_flips_per_day: default_max_flips_per_day(),
        }
    }
}

fn default_max_flips_per_day() -> u32 {
    DEFAULT_MAX_FLIPS_PER_DAY
}

/// Today's flip allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipStatus {
    pub can_flip: bool,
    pub flips_used_today: u32,
    pub flips_remaining_today: u32,
    pub max_flips_per_day: u32,
}

/// Result of a flip attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlipOutcome {
    fn flipped(new_total: f64) -> Self {
        Self {
            success: true,
            new_total: Some(new_total),
            error: None,
        }
    }

    fn refused(error: impl Into<String>) -> Self {
        Self {
            success: false,
            new_total: None,
            error: Some(error.into()),
        }
    }
}

/// Tracks flips against a per-day quota.
pub struct FlipQuota {
    engine: QuotaEngine,
    clock: Arc<dyn Clock>,
    max_flips_per_day: u32,
}

impl FlipQuota {
    /// Create a flip quota on the system clock.
    pub fn new(config: FlipConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a flip quota on the given clock.
    pub fn with_clock(config: FlipConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: QuotaEngine::with_clock(clock.clone()),
            clock,
            max_flips_per_day: config.max_flips_per_day,
        }
    }

    /// Today's allowance. Does not consume a flip.
    pub fn status(&self) -> FlipStatus {
        let (key, _) = day_window(self.clock.now_millis());
        let used = self.engine.usage(&key).min(self.max_flips_per_day);
        let remaining = self.max_flips_per_day - used;

        FlipStatus {
            can_flip: remaining > 0,
            flips_used_today: used,
            flips_remaining_today: remaining,
            max_flips_per_day: self.max_flips_per_day,
        }
    }

    /// Consume one of today's flips and negate `verified_total`.
    ///
    /// Non-finite totals are refused without consuming a flip.
    pub fn perform_flip(&self, verified_total: f64) -> FlipOutcome {
        if !verified_total.is_finite() {
            return FlipOutcome::refused("Total cannot be flipped");
        }
        let new_total = -verified_total;

        let (key, midnight) = day_window(self.clock.now_millis());
        let decision = self
            .engine
            .admit_until(&key, self.max_flips_per_day, midnight);

        if !decision.allowed {
            debug!(day = %key, "Flip refused, daily quota used up");
            return FlipOutcome::refused("No flips remaining today");
        }

        info!(
            previous_total = verified_total,
            new_total = new_total,
            flips_remaining_today = decision.remaining,
            "Flip performed"
        );
        FlipOutcome::flipped(new_total)
    }
}

/// Store key for the UTC day containing `now_millis`, and the epoch
/// millisecond of the following midnight.
fn day_window(now_millis: u64) -> (String, u64) {
    let now = DateTime::<Utc>::from_timestamp_millis(now_millis as i64).unwrap_or_default();
    let today = now.date_naive();
    let midnight = today
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map_or(u64::MAX, |t| t.and_utc().timestamp_millis() as u64);

    (format!("flip:{}", today.format("%Y-%m-%d")), midnight)
}
