use crate::message::{ContentFormat, Request, Response, ResponseCode};
use crate::middleware::Middleware;
use crate::resource::{HandlerError, ResourceTable};
use crate::worker_pool::{CallOutcome, PoolRejection, ResourceCall, WorkerPool, WorkerPoolConfig};
use may::sync::mpsc;
use std::collections::HashMap;
use std::io;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// The only representation resources are rendered in.
pub const OFFERED_FORMAT: ContentFormat = ContentFormat::TEXT_PLAIN;

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Longest wait for a handler before answering 5.03
    pub handler_timeout: Duration,
    /// Pool settings applied to every resource
    pub worker_pool: WorkerPoolConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(5),
            worker_pool: WorkerPoolConfig::default(),
        }
    }
}

/// Routes requests to resource handlers and turns their outcome into a response.
///
/// The resource table is sealed on construction; each resource gets its own
/// worker pool. The dispatcher itself holds no locks and is shared via `Arc`.
pub struct Dispatcher {
    table: ResourceTable,
    pools: HashMap<String, WorkerPool>,
    /// Ordered list of middleware to apply to requests/responses
    middlewares: Vec<Arc<dyn Middleware>>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Seal `table` and spawn a worker pool per resource.
    ///
    /// Must be called from a context where the `may` runtime can spawn
    /// coroutines (any thread will do).
    pub fn new(mut table: ResourceTable, config: DispatcherConfig) -> io::Result<Self> {
        table.seal();

        let mut pools = HashMap::with_capacity(table.len());
        for (path, handler) in table.iter() {
            let pool = WorkerPool::new(path, config.worker_pool, Arc::clone(handler))?;
            pools.insert(path.to_string(), pool);
        }

        info!(
            resources = ?table.paths(),
            handler_timeout_ms = config.handler_timeout.as_millis() as u64,
            "Dispatcher ready"
        );

        Ok(Self {
            table,
            pools,
            middlewares: Vec::new(),
            config,
        })
    }

    /// Add middleware to the processing pipeline
    ///
    /// Middleware is executed in the order it's added.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    /// The sealed resource table.
    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.table
    }

    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Turn one request into exactly one response.
    ///
    /// Lookup, method check and content negotiation are answered without
    /// touching a handler. Everything after that is bounded by
    /// [`DispatcherConfig::handler_timeout`].
    pub fn dispatch(&self, request: Request) -> Response {
        let start = Instant::now();

        let mut early_resp: Option<Response> = None;
        for (idx, mw) in self.middlewares.iter().enumerate() {
            if early_resp.is_none() {
                early_resp = mw.before(&request);
                if early_resp.is_some() {
                    debug!(
                        request_id = %request.request_id,
                        middleware_idx = idx,
                        middleware_name = std::any::type_name_of_val(mw.as_ref()),
                        "Middleware returned early response"
                    );
                }
            } else {
                mw.before(&request);
            }
        }

        let mut resp = match early_resp {
            Some(r) => r,
            None => self.route(&request),
        };

        let latency = start.elapsed();
        for mw in &self.middlewares {
            mw.after(&request, &mut resp, latency);
        }
        resp
    }

    fn route(&self, request: &Request) -> Response {
        let Some(handler) = self.table.get(&request.path) else {
            debug!(
                request_id = %request.request_id,
                path = %request.path,
                available = self.table.len(),
                "No resource at path"
            );
            return Response::empty(ResponseCode::NotFound);
        };

        if !handler.methods().contains(&request.method) {
            debug!(
                request_id = %request.request_id,
                path = %request.path,
                method = %request.method,
                allowed = ?handler.methods(),
                "Method not supported by resource"
            );
            return Response::empty(ResponseCode::MethodNotAllowed);
        }

        if let Some(accept) = request.accept.filter(|f| *f != OFFERED_FORMAT) {
            debug!(
                request_id = %request.request_id,
                path = %request.path,
                accept = %accept,
                "Requested content format not offered"
            );
            return Response::empty(ResponseCode::NotAcceptable);
        }

        self.invoke(request)
    }

    fn invoke(&self, request: &Request) -> Response {
        let Some(pool) = self.pools.get(&request.path) else {
            // Every sealed resource gets a pool in `new`
            error!(
                request_id = %request.request_id,
                path = %request.path,
                "Resource has no worker pool - CRITICAL"
            );
            return Response::error(ResponseCode::InternalServerError, "no worker pool");
        };

        let (reply_tx, reply_rx) = mpsc::channel();
        let call = ResourceCall {
            request: request.clone(),
            reply_tx,
        };

        debug!(
            request_id = %request.request_id,
            path = %request.path,
            method = %request.method,
            "Request dispatched to handler"
        );

        if let Err(rejection) = pool.dispatch(call) {
            return match rejection {
                PoolRejection::QueueFull => {
                    Response::error(ResponseCode::ServiceUnavailable, "resource busy")
                }
                PoolRejection::Disconnected => {
                    Response::error(ResponseCode::ServiceUnavailable, "resource not responding")
                }
            };
        }

        let start = Instant::now();
        match reply_rx.recv_timeout(self.config.handler_timeout) {
            Ok(CallOutcome::Completed(Ok(value))) => {
                debug!(
                    request_id = %request.request_id,
                    path = %request.path,
                    latency_us = start.elapsed().as_micros() as u64,
                    "Handler response received"
                );
                Response::text(value.render())
            }
            Ok(CallOutcome::Completed(Err(HandlerError::Unavailable(reason)))) => {
                warn!(
                    request_id = %request.request_id,
                    path = %request.path,
                    reason = %reason,
                    "Resource unavailable"
                );
                // The reason can name local files; peers only get the status
                Response::error(ResponseCode::ServiceUnavailable, "resource unavailable")
            }
            Ok(CallOutcome::Completed(Err(HandlerError::Failed(reason)))) => {
                error!(
                    request_id = %request.request_id,
                    path = %request.path,
                    reason = %reason,
                    "Handler failed"
                );
                Response::error(ResponseCode::InternalServerError, "handler failed")
            }
            Ok(CallOutcome::Panicked(_)) => {
                // Already logged with the panic message on the worker
                Response::error(ResponseCode::InternalServerError, "handler panicked")
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    request_id = %request.request_id,
                    path = %request.path,
                    timeout_ms = self.config.handler_timeout.as_millis() as u64,
                    "Handler timed out"
                );
                Response::error(ResponseCode::ServiceUnavailable, "handler timed out")
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!(
                    request_id = %request.request_id,
                    path = %request.path,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Handler channel closed - handler may have crashed"
                );
                Response::error(ResponseCode::ServiceUnavailable, "resource not responding")
            }
        }
    }

    /// Get metrics for all worker pools
    ///
    /// Maps each path to `(queue_depth, shed, dispatched, completed)`.
    #[must_use]
    pub fn worker_pool_metrics(&self) -> HashMap<String, (usize, u64, u64, u64)> {
        self.pools
            .iter()
            .map(|(path, pool)| {
                let m = pool.metrics();
                (
                    path.clone(),
                    (
                        m.queue_depth(),
                        m.shed_count(),
                        m.dispatched_count(),
                        m.completed_count(),
                    ),
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("resources", &self.table)
            .field("middlewares", &self.middlewares.len())
            .field("config", &self.config)
            .finish()
    }
}
