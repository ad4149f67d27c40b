//! HTTP surface: quota middleware, API routes and the server.

mod middleware;
mod routes;
mod server;

pub use middleware::{
    enforce_quota, MiddlewareResult, QuotaGuard, RATE_LIMIT_MESSAGE, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use routes::{app, guard, router, AppState};
pub use server::{shutdown_signal, HttpServer};
