//! Request-boundary adapter from quota decisions to HTTP signals.
//!
//! The engine knows nothing about HTTP. This module derives the client key,
//! asks the backend for a [`Decision`], and turns it into either a 429 with a
//! `Retry-After` hint or a pass-through decorated with quota headers.

use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, trace, warn};

use crate::ratelimit::{ClientKey, Decision, EndpointRules, QuotaBackend, QuotaConfig};

/// Body-level message sent with every rejection.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please try again later.";

/// `X-RateLimit-Limit`
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// `X-RateLimit-Remaining`
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// `X-RateLimit-Reset`, in epoch seconds
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// What the request boundary should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareResult {
    /// Pass the request through to its handler.
    Allowed {
        remaining: u32,
        limit: u32,
        reset_time: u64,
    },
    /// Reject the request until the window resets.
    Rejected {
        message: String,
        limit: u32,
        reset_time: u64,
        retry_after_secs: u64,
    },
}

impl MiddlewareResult {
    /// Convert an engine decision made at `now`.
    pub fn from_decision(decision: Decision, now: u64) -> Self {
        if decision.allowed {
            MiddlewareResult::Allowed {
                remaining: decision.remaining,
                limit: decision.limit,
                reset_time: decision.reset_time,
            }
        } else {
            MiddlewareResult::Rejected {
                message: RATE_LIMIT_MESSAGE.to_string(),
                limit: decision.limit,
                reset_time: decision.reset_time,
                retry_after_secs: decision.retry_after_secs(now),
            }
        }
    }

    /// Whether the request must be turned away.
    pub fn is_rejected(&self) -> bool {
        matches!(self, MiddlewareResult::Rejected { .. })
    }

    /// Remaining quota; `None` on rejection.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            MiddlewareResult::Allowed { remaining, .. } => Some(*remaining),
            MiddlewareResult::Rejected { .. } => None,
        }
    }

    /// Rejection message; `None` when allowed.
    pub fn message(&self) -> Option<&str> {
        match self {
            MiddlewareResult::Allowed { .. } => None,
            MiddlewareResult::Rejected { message, .. } => Some(message),
        }
    }

    /// Epoch milliseconds at which the window resets.
    pub fn reset_time(&self) -> u64 {
        match self {
            MiddlewareResult::Allowed { reset_time, .. }
            | MiddlewareResult::Rejected { reset_time, .. } => *reset_time,
        }
    }

    /// The limit the request was checked against.
    pub fn limit(&self) -> u32 {
        match self {
            MiddlewareResult::Allowed { limit, .. } | MiddlewareResult::Rejected { limit, .. } => {
                *limit
            }
        }
    }

    /// Write the quota headers for this result.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit()));
        headers.insert(
            X_RATELIMIT_REMAINING,
            HeaderValue::from(self.remaining().unwrap_or(0)),
        );
        headers.insert(
            X_RATELIMIT_RESET,
            HeaderValue::from(self.reset_time().div_ceil(1000)),
        );
        if let MiddlewareResult::Rejected {
            retry_after_secs, ..
        } = self
        {
            headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }
    }

    /// The 429 response for a rejection; `None` when allowed.
    pub fn rejection_response(&self) -> Option<Response> {
        let message = self.message()?;
        let mut response =
            (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message }))).into_response();
        self.apply_headers(response.headers_mut());
        Some(response)
    }
}

/// Wraps a quota backend for use at the request boundary.
///
/// Clones share the backend and the rules.
#[derive(Clone)]
pub struct QuotaGuard {
    backend: Arc<dyn QuotaBackend>,
    rules: Arc<RwLock<EndpointRules>>,
}

impl QuotaGuard {
    /// Create a guard over `backend`, choosing quotas per path from `rules`.
    pub fn new(backend: Arc<dyn QuotaBackend>, rules: EndpointRules) -> Self {
        Self {
            backend,
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    /// Get the current endpoint rules.
    pub fn rules(&self) -> EndpointRules {
        self.rules.read().clone()
    }

    /// Replace the endpoint rules.
    ///
    /// Existing windows keep their reset times; new limits apply from the
    /// next check.
    pub fn set_rules(&self, rules: EndpointRules) {
        info!(
            endpoints = rules.endpoints.len(),
            default_max_requests = rules.default.max_requests,
            "Endpoint quota rules replaced"
        );
        *self.rules.write() = rules;
    }

    /// Check one request against `config`.
    pub fn evaluate<B>(&self, request: &Request<B>, config: &QuotaConfig) -> MiddlewareResult {
        let key = ClientKey::from_request(request);
        let decision = self.backend.check(&key.to_string_key(), config);
        let result = MiddlewareResult::from_decision(decision, self.backend.now_millis());

        match &result {
            MiddlewareResult::Rejected {
                retry_after_secs, ..
            } => warn!(
                key = %key,
                retry_after_secs = *retry_after_secs,
                "Request rejected by quota"
            ),
            MiddlewareResult::Allowed { remaining, .. } => {
                trace!(key = %key, remaining = *remaining, "Request admitted")
            }
        }

        result
    }

    /// Check one request against the quota configured for its path.
    pub fn evaluate_path<B>(&self, request: &Request<B>) -> MiddlewareResult {
        let config = *self.rules.read().quota_for(request.uri().path());
        self.evaluate(request, &config)
    }
}

/// Axum middleware enforcing the guard's quotas.
///
/// Mount with `axum::middleware::from_fn_with_state(guard, enforce_quota)`.
pub async fn enforce_quota(
    State(guard): State<QuotaGuard>,
    request: Request,
    next: Next,
) -> Response {
    let result = guard.evaluate_path(&request);

    if let Some(rejection) = result.rejection_response() {
        return rejection;
    }

    let mut response = next.run(request).await;
    result.apply_headers(response.headers_mut());
    response
}
