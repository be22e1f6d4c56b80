//! # Middleware Module
//!
//! Hooks the dispatcher runs around every request.
//!
//! `before` hooks run in registration order and may short-circuit with a
//! response; `after` hooks always run, in registration order, and see the
//! final response together with the time spent dispatching.

mod core;
mod metrics;
mod tracing;

pub use self::core::Middleware;
pub use self::metrics::MetricsMiddleware;
pub use self::tracing::TracingMiddleware;
