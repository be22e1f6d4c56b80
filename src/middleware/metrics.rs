use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::message::{Request, Response};

/// Request counters kept with relaxed atomics.
///
/// Metrics collected:
/// - Total request count
/// - 4.xx and 5.xx response counts
/// - Average latency
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    client_errors: AtomicUsize,
    server_errors: AtomicUsize,
    total_latency_ns: AtomicU64,
}

impl MetricsMiddleware {
    /// Create a new metrics middleware with all counters initialized to zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests processed
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Responses with a 4.xx code
    pub fn client_errors(&self) -> usize {
        self.client_errors.load(Ordering::Relaxed)
    }

    /// Responses with a 5.xx code
    pub fn server_errors(&self) -> usize {
        self.server_errors.load(Ordering::Relaxed)
    }

    /// Calculate the average request latency
    ///
    /// Returns zero duration if no requests have been processed yet.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _req: &Request) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, _req: &Request, res: &mut Response, latency: Duration) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        if res.status.is_client_error() {
            self.client_errors.fetch_add(1, Ordering::Relaxed);
        } else if res.status.is_server_error() {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Method, ResponseCode};

    #[test]
    fn test_counts_by_status_class() {
        let mw = MetricsMiddleware::new();
        let req = Request::new(Method::Get, "/temp");

        for status in [
            ResponseCode::Content,
            ResponseCode::NotFound,
            ResponseCode::ServiceUnavailable,
        ] {
            assert!(mw.before(&req).is_none());
            mw.after(&req, &mut Response::empty(status), Duration::from_millis(3));
        }

        assert_eq!(mw.request_count(), 3);
        assert_eq!(mw.client_errors(), 1);
        assert_eq!(mw.server_errors(), 1);
        assert_eq!(mw.average_latency(), Duration::from_millis(3));
    }

    #[test]
    fn test_average_latency_zero_without_requests() {
        assert_eq!(MetricsMiddleware::new().average_latency(), Duration::ZERO);
    }
}
