//! Fixed-window request quotas and the state behind them.

mod backend;
mod clock;
mod engine;
mod key;
mod rules;
mod store;
mod sweeper;
mod window;

pub use backend::QuotaBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::QuotaEngine;
pub use key::{client_identity, ClientKey, FORWARDED_FOR_HEADER, REAL_IP_HEADER, UNKNOWN_IDENTITY};
pub use rules::{EndpointRule, EndpointRules, FLIP_MAX_REQUESTS, FLIP_PATH};
pub use store::WindowStore;
pub use sweeper::{Sweeper, DEFAULT_SWEEP_PROBABILITY};
pub use window::{Decision, QuotaConfig, Window, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_MS};
