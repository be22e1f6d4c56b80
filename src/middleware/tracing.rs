use std::time::Duration;

use tracing::{debug, info, warn};

use super::Middleware;
use crate::message::{Request, Response};

/// One structured access line per request.
///
/// 2.xx at `info`, 4.xx at `debug`, 5.xx at `warn`.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn after(&self, req: &Request, res: &mut Response, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        if res.status.is_server_error() {
            warn!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = %res.status.code(),
                latency_us,
                "Request failed"
            );
        } else if res.status.is_client_error() {
            debug!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = %res.status.code(),
                latency_us,
                "Request rejected"
            );
        } else {
            info!(
                request_id = %req.request_id,
                method = %req.method,
                path = %req.path,
                status = %res.status.code(),
                latency_us,
                "Request served"
            );
        }
    }
}
