use crate::exchange::ExchangeRegistry;
use crate::logging::LoggingGuard;
use may::coroutine::JoinHandle;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Handle to a running server
///
/// Stopping or joining consumes the handle. The logging guard the server was
/// given is dropped last, after the coroutines have finished.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    receive: JoinHandle<()>,
    sweep: JoinHandle<()>,
    registry: Arc<ExchangeRegistry>,
    logging: Option<LoggingGuard>,
}

impl ServerHandle {
    pub(crate) fn new(
        addr: SocketAddr,
        shutdown: Arc<AtomicBool>,
        receive: JoinHandle<()>,
        sweep: JoinHandle<()>,
        registry: Arc<ExchangeRegistry>,
        logging: Option<LoggingGuard>,
    ) -> Self {
        Self {
            addr,
            shutdown,
            receive,
            sweep,
            registry,
            logging,
        }
    }

    /// Address the socket is bound to (useful with port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Exchange bookkeeping of the running server.
    #[must_use]
    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        &self.registry
    }

    /// `false` once [`stop`](Self::stop) has begun.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Acquire)
    }

    /// Stop the server
    ///
    /// Sets the shutdown flag, cancels the receive loop and the sweep, and
    /// waits for both. Request coroutines already running finish on their own.
    #[allow(unsafe_code)]
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Release);
        info!(addr = %self.addr, in_flight = self.registry.len(), "Server stopping");
        // SAFETY: may marks cancel unsafe because a cancelled coroutine unwinds
        // from its current blocking point. Both coroutines only hold Arcs and
        // may channels/sockets, which are left consistent by the unwind.
        unsafe {
            self.receive.coroutine().cancel();
            self.sweep.coroutine().cancel();
        }
        // Cancelled coroutines report a panic on join
        let _ = self.receive.join();
        let _ = self.sweep.join();
        info!(addr = %self.addr, "Server stopped");
        drop(self.logging);
    }

    /// Wait for the receive loop to finish.
    ///
    /// The loop only ends if its coroutine panics, so this normally blocks for
    /// the life of the process. Use [`stop`](Self::stop) for a clean shutdown.
    #[allow(unsafe_code)]
    pub fn join(self) -> std::thread::Result<()> {
        let result = self.receive.join();
        self.shutdown.store(true, Ordering::Release);
        // SAFETY: see `stop`
        unsafe {
            self.sweep.coroutine().cancel();
        }
        let _ = self.sweep.join();
        drop(self.logging);
        result
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .field("running", &self.is_running())
            .finish()
    }
}
