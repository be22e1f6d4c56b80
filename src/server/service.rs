use super::{ServerHandle, Transport, MAX_DATAGRAM_LEN};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::exchange::{DedupKey, Exchange, ExchangeRegistry, Seen, SweepReport};
use crate::logging::LoggingGuard;
use crate::message::{Message, MessageType, Request, Response, ResponseCode};
use crate::runtime_config::spawn_coroutine;
use may::sync::mpsc;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// A CoAP server: dispatcher plus the UDP shell around it.
pub struct CoapServer {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    registry: Arc<ExchangeRegistry>,
    logging: Option<LoggingGuard>,
}

impl CoapServer {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, config: ServerConfig) -> Self {
        let registry = Arc::new(config.exchange_registry());
        Self {
            dispatcher: Arc::new(dispatcher),
            config,
            registry,
            logging: None,
        }
    }

    /// Hand over the logging guard so logging is torn down with the server.
    #[must_use]
    pub fn with_logging_guard(mut self, guard: LoggingGuard) -> Self {
        self.logging = Some(guard);
        self
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ExchangeRegistry> {
        &self.registry
    }

    /// Bind a UDP socket on `addr` and start serving.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let socket = may::net::UdpSocket::bind(addr)?;
        self.start_with_transport(socket)
    }

    /// Start serving on an already bound transport.
    #[allow(unsafe_code)]
    pub fn start_with_transport<T: Transport>(self, transport: T) -> io::Result<ServerHandle> {
        let addr = transport.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let stack_size = self.config.stack_size;
        let shell = Arc::new(Shell {
            transport,
            dispatcher: self.dispatcher,
            registry: Arc::clone(&self.registry),
            config: self.config,
            next_message_id: AtomicU16::new(rand::random()),
            shutdown: Arc::clone(&shutdown),
        });

        let receive_shell = Arc::clone(&shell);
        let receive = spawn_coroutine("coap-receive".to_string(), stack_size, move || {
            receive_shell.receive_loop();
        })?;

        let sweep_shell = Arc::clone(&shell);
        let sweep = match spawn_coroutine("coap-sweep".to_string(), stack_size, move || {
            sweep_shell.sweep_loop();
        }) {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.store(true, Ordering::Release);
                // SAFETY: the receive coroutine only holds an Arc of the shell
                unsafe {
                    receive.coroutine().cancel();
                }
                let _ = receive.join();
                return Err(e);
            }
        };

        info!(
            addr = %addr,
            resources = ?shell.dispatcher.resources().paths(),
            piggyback_window_ms = shell.config.piggyback_window.as_millis() as u64,
            sweep_interval_ms = shell.config.sweep_interval.as_millis() as u64,
            "CoAP server listening"
        );

        Ok(ServerHandle::new(
            addr,
            shutdown,
            receive,
            sweep,
            self.registry,
            self.logging,
        ))
    }
}

/// State shared by the shell's coroutines.
struct Shell<T> {
    transport: T,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ExchangeRegistry>,
    config: ServerConfig,
    next_message_id: AtomicU16,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport> Shell<T> {
    fn receive_loop(self: &Arc<Self>) {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        while !self.shutdown.load(Ordering::Acquire) {
            match self.transport.recv_from(&mut buf) {
                Ok((len, peer)) => self.handle_datagram(&buf[..len], peer),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    warn!(error = %e, "Receive failed");
                }
            }
        }
        debug!("Receive loop exiting");
    }

    fn sweep_loop(self: &Arc<Self>) {
        while !self.shutdown.load(Ordering::Acquire) {
            may::coroutine::sleep(self.config.sweep_interval);
            let now = Instant::now();
            let report = self
                .registry
                .retransmission_sweep(now, |exchange| self.send_bytes(&exchange.bytes, exchange.peer));
            let pruned = self.registry.prune_duplicates(now);
            if report != SweepReport::default() || pruned > 0 {
                debug!(
                    retransmitted = report.retransmitted,
                    expired = report.expired,
                    pruned,
                    in_flight = self.registry.len(),
                    "Sweep"
                );
            }
        }
    }

    fn handle_datagram(self: &Arc<Self>, bytes: &[u8], peer: SocketAddr) {
        let msg = match Message::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(peer = %peer, len = bytes.len(), error = %e, "Dropping undecodable datagram");
                if let Some((MessageType::Confirmable, message_id)) = Message::peek_header(bytes) {
                    self.send(&Message::reset(message_id), peer);
                }
                return;
            }
        };

        trace!(
            peer = %peer,
            mtype = ?msg.mtype,
            code = %msg.code,
            message_id = msg.message_id,
            "Datagram received"
        );

        match msg.mtype {
            MessageType::Acknowledgement | MessageType::Reset => {
                if self.registry.cancel(msg.message_id) {
                    debug!(peer = %peer, message_id = msg.message_id, mtype = ?msg.mtype, "Exchange closed by peer");
                }
            }
            MessageType::Confirmable if msg.code.is_empty() => {
                // CoAP ping
                self.send(&Message::reset(msg.message_id), peer);
            }
            _ if msg.code.is_request() => self.handle_request(msg, peer),
            MessageType::Confirmable if msg.code.is_response() => {
                // Not a client; acknowledge so the peer stops retransmitting
                self.send(&Message::empty_ack(msg.message_id), peer);
            }
            _ => {
                debug!(peer = %peer, code = %msg.code, "Ignoring unexpected message");
            }
        }
    }

    fn handle_request(self: &Arc<Self>, msg: Message, peer: SocketAddr) {
        let key = DedupKey::new(peer, msg.message_id);
        match self.registry.check_duplicate(key, Instant::now()) {
            Seen::New => {}
            Seen::Duplicate(Some(reply)) => {
                debug!(peer = %peer, message_id = msg.message_id, "Duplicate request, replaying reply");
                self.send_bytes(&reply, peer);
                return;
            }
            Seen::Duplicate(None) => {
                debug!(peer = %peer, message_id = msg.message_id, "Duplicate request still in progress");
                return;
            }
        }

        let request = match Request::from_message(&msg) {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %peer, code = %msg.code, error = %e, "Rejecting request");
                let message_id = self.reply_message_id(msg.mtype, msg.message_id);
                let reply = Response::empty(e.status()).into_message(
                    reply_type(msg.mtype),
                    message_id,
                    &msg.token,
                );
                self.reply(key, &reply);
                return;
            }
        };

        let shell = Arc::clone(self);
        let name = format!("coap-request-{}", request.request_id);
        let spawned = spawn_coroutine(name, self.config.stack_size, move || {
            shell.serve_request(request, key);
        });
        if let Err(e) = spawned {
            error!(peer = %peer, message_id = msg.message_id, error = %e, "Failed to spawn request coroutine");
            let message_id = self.reply_message_id(msg.mtype, msg.message_id);
            let reply = Response::error(ResponseCode::ServiceUnavailable, "overloaded")
                .into_message(reply_type(msg.mtype), message_id, &msg.token);
            self.reply(key, &reply);
        }
    }

    fn serve_request(self: &Arc<Self>, request: Request, key: DedupKey) {
        let token = request.token.clone();

        if !request.confirmable {
            let response = self.dispatcher.dispatch(request);
            let reply =
                response.into_message(MessageType::NonConfirmable, self.next_message_id(), &token);
            self.reply(key, &reply);
            return;
        }

        let (tx, rx) = mpsc::channel();
        let dispatcher = Arc::clone(&self.dispatcher);
        let name = format!("coap-dispatch-{}", request.request_id);
        let request_id = request.request_id;
        // The request moves into the child; keep a copy for the inline fallback
        let fallback = request.clone();
        let spawned = spawn_coroutine(name, self.config.stack_size, move || {
            let _ = tx.send(dispatcher.dispatch(request));
        });
        if let Err(e) = spawned {
            warn!(request_id = %request_id, error = %e, "Dispatching inline, no piggyback window");
            let response = self.dispatcher.dispatch(fallback);
            self.reply(
                key,
                &response.into_message(MessageType::Acknowledgement, key.message_id, &token),
            );
            return;
        }

        match rx.recv_timeout(self.config.piggyback_window) {
            Ok(response) => {
                let reply =
                    response.into_message(MessageType::Acknowledgement, key.message_id, &token);
                self.reply(key, &reply);
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!(
                    request_id = %request_id,
                    window_ms = self.config.piggyback_window.as_millis() as u64,
                    "Handler slower than piggyback window, sending separate response"
                );
                self.reply(key, &Message::empty_ack(key.message_id));
                match rx.recv() {
                    Ok(response) => self.send_separate(key.peer, token, response),
                    Err(_) => {
                        error!(request_id = %request_id, "Dispatch coroutine ended without a response");
                        let response =
                            Response::error(ResponseCode::InternalServerError, "dispatch failed");
                        self.send_separate(key.peer, token, response);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!(request_id = %request_id, "Dispatch coroutine ended without a response");
                let reply = Response::error(ResponseCode::InternalServerError, "dispatch failed")
                    .into_message(MessageType::Acknowledgement, key.message_id, &token);
                self.reply(key, &reply);
            }
        }
    }

    /// Send a response as its own confirmable message and track it for retransmission.
    fn send_separate(&self, peer: SocketAddr, token: Vec<u8>, response: Response) {
        let message_id = self.next_message_id();
        let msg = response.into_message(MessageType::Confirmable, message_id, &token);
        let bytes = msg.encode();
        let exchange = Exchange::new(
            message_id,
            token,
            peer,
            bytes.clone(),
            Instant::now(),
            self.registry.params(),
        );
        if let Err(e) = self.registry.schedule(exchange) {
            warn!(peer = %peer, message_id, error = %e, "Separate response sent without retransmission");
        }
        self.send_bytes(&bytes, peer);
    }

    /// Send `msg` and remember it as the reply for `key`.
    fn reply(&self, key: DedupKey, msg: &Message) {
        let bytes = msg.encode();
        // Record first: a retransmitted request may arrive as soon as this is sent
        self.registry.record_reply(key, bytes.clone());
        self.send_bytes(&bytes, key.peer);
    }

    fn send(&self, msg: &Message, peer: SocketAddr) {
        self.send_bytes(&msg.encode(), peer);
    }

    fn send_bytes(&self, bytes: &[u8], peer: SocketAddr) {
        if let Err(e) = self.transport.send_to(bytes, peer) {
            warn!(peer = %peer, len = bytes.len(), error = %e, "Send failed");
        }
    }

    fn next_message_id(&self) -> u16 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// ACKs reuse the request's id, NON replies get a fresh one.
    fn reply_message_id(&self, request_type: MessageType, request_id: u16) -> u16 {
        match request_type {
            MessageType::Confirmable => request_id,
            _ => self.next_message_id(),
        }
    }
}

fn reply_type(request_type: MessageType) -> MessageType {
    match request_type {
        MessageType::Confirmable => MessageType::Acknowledgement,
        _ => MessageType::NonConfirmable,
    }
}
