//! # Worker Pool Module
//!
//! Each registered resource gets a pool of worker coroutines so that slow
//! handlers (a sensor read that blocks, say) do not serialize every request for
//! the same path.
//!
//! ## Features
//!
//! - **Worker Pools**: N worker coroutines per resource share one request queue
//! - **Panic Recovery**: a panicking handler yields [`CallOutcome::Panicked`]
//!   instead of taking the worker down
//! - **Load Shedding**: once `queue_bound` calls are in flight, new calls are
//!   refused and the dispatcher answers 5.03
//! - **Metrics**: queue depth, dispatched, completed and shed counts
//!
//! ## Configuration
//!
//! [`WorkerPoolConfig`] is part of [`crate::config::ServerConfig`]. The
//! environment overrides are `MINICOAP_HANDLER_WORKERS` (default: 4),
//! `MINICOAP_HANDLER_QUEUE_BOUND` (default: 64) and `MINICOAP_STACK_SIZE`
//! (default: 64 KB).

use crate::message::Request;
use crate::resource::{HandlerError, ResourceHandler, ResourceValue};
use crate::runtime_config::{spawn_coroutine, DEFAULT_STACK_SIZE};
use may::sync::mpsc;
use serde::Deserialize;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a worker reports back for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Handler finished, successfully or not
    Completed(Result<ResourceValue, HandlerError>),
    /// Handler panicked; the message is the panic payload if it was a string
    Panicked(String),
}

/// One unit of work for a worker.
pub struct ResourceCall {
    /// Decoded request
    pub request: Request,
    /// Where the worker sends the outcome
    pub reply_tx: mpsc::Sender<CallOutcome>,
}

/// Configuration for a worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// In-flight calls allowed before shedding
    pub queue_bound: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_bound: 64,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

/// Metrics for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    shed_count: AtomicU64,
    queue_depth: AtomicUsize,
    dispatched_count: AtomicU64,
    completed_count: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_shed(&self) {
        self.shed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn shed_count(&self) -> u64 {
        self.shed_count.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }
}

/// Why a call could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolRejection {
    /// `queue_bound` calls already in flight
    #[error("worker queue is full")]
    QueueFull,
    /// Every worker has exited
    #[error("worker pool is disconnected")]
    Disconnected,
}

/// A pool of coroutines serving one resource.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<ResourceCall>,
    metrics: Arc<WorkerPoolMetrics>,
    path: String,
}

impl WorkerPool {
    /// Spawn `config.num_workers` coroutines running `handler`.
    ///
    /// Fails only if not a single worker could be spawned.
    pub fn new(
        path: &str,
        config: WorkerPoolConfig,
        handler: Arc<dyn ResourceHandler>,
    ) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<ResourceCall>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(WorkerPoolMetrics::new());

        info!(
            path = %path,
            num_workers = config.num_workers,
            queue_bound = config.queue_bound,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        let mut spawned = 0usize;
        let mut last_error = None;
        for worker_id in 0..config.num_workers.max(1) {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);
            let metrics = Arc::clone(&metrics);
            let worker_path = path.to_string();

            let spawn_result = spawn_coroutine(
                format!("{path}#{worker_id}"),
                config.stack_size,
                move || {
                    debug!(path = %worker_path, worker_id, "Worker coroutine started");

                    // All workers share the receiver and drain it until every sender is gone
                    while let Ok(call) = rx.recv() {
                        let ResourceCall { request, reply_tx } = call;
                        let outcome =
                            run_handler(handler.as_ref(), &request, &worker_path, worker_id);
                        metrics.record_completion();
                        if reply_tx.send(outcome).is_err() {
                            debug!(
                                request_id = %request.request_id,
                                path = %worker_path,
                                "Caller stopped waiting before the handler finished"
                            );
                        }
                    }

                    debug!(path = %worker_path, worker_id, "Worker coroutine exiting");
                },
            );

            match spawn_result {
                Ok(_) => spawned += 1,
                Err(e) => {
                    error!(path = %path, worker_id, error = %e, "Failed to spawn worker coroutine");
                    last_error = Some(e);
                }
            }
        }

        if spawned == 0 {
            return Err(last_error
                .unwrap_or_else(|| io::Error::other(format!("no workers spawned for {path}"))));
        }

        Ok(Self {
            config,
            sender: tx,
            metrics,
            path: path.to_string(),
        })
    }

    /// Queue a call, or refuse it when the pool is saturated or gone.
    pub fn dispatch(&self, call: ResourceCall) -> Result<(), PoolRejection> {
        if self.metrics.queue_depth() >= self.config.queue_bound {
            self.metrics.record_shed();
            warn!(
                request_id = %call.request.request_id,
                path = %self.path,
                queue_depth = self.metrics.queue_depth(),
                "Worker queue full - shedding request"
            );
            return Err(PoolRejection::QueueFull);
        }

        self.metrics.record_dispatch();
        if let Err(e) = self.sender.send(call) {
            // Undo the depth bump; the call never reached a worker
            self.metrics.record_completion();
            error!(
                request_id = %e.0.request.request_id,
                path = %self.path,
                "Worker pool channel disconnected"
            );
            return Err(PoolRejection::Disconnected);
        }
        Ok(())
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }
}

fn run_handler(
    handler: &dyn ResourceHandler,
    request: &Request,
    path: &str,
    worker_id: usize,
) -> CallOutcome {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.handle(request))) {
        Ok(result) => CallOutcome::Completed(result),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                request_id = %request.request_id,
                path = %path,
                worker_id,
                panic_message = %message,
                "Handler panicked - CRITICAL"
            );
            CallOutcome::Panicked(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.queue_bound, 64);
        assert_eq!(config.stack_size, 0x10000);
    }

    #[test]
    fn test_worker_pool_metrics() {
        let metrics = WorkerPoolMetrics::new();

        assert_eq!(metrics.shed_count(), 0);
        assert_eq!(metrics.queue_depth(), 0);

        metrics.record_dispatch();
        assert_eq!(metrics.dispatched_count(), 1);
        assert_eq!(metrics.queue_depth(), 1);

        metrics.record_completion();
        assert_eq!(metrics.completed_count(), 1);
        assert_eq!(metrics.queue_depth(), 0);

        metrics.record_shed();
        assert_eq!(metrics.shed_count(), 1);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let handler = |_: &Request| -> Result<ResourceValue, HandlerError> { panic!("boom") };
        let outcome = run_handler(&handler, &Request::new(crate::message::Method::Get, "/x"), "/x", 0);
        assert_eq!(outcome, CallOutcome::Panicked("boom".to_string()));
    }
}
