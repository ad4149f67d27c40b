//! Aura Gate - per-client request quotas for a small web API
//!
//! This crate decides, for every inbound request, whether it may proceed or
//! must wait until its client's fixed window resets. Quota state lives in
//! memory in a single process; running several instances gives each one its
//! own independent quotas.

pub mod config;
pub mod error;
pub mod flip;
pub mod http;
pub mod ratelimit;
