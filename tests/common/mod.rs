#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

//! Shared helpers for integration tests: a test subscriber, a server on an
//! ephemeral port and a blocking CoAP client.

use minicoap::config::ServerConfig;
use minicoap::dispatcher::Dispatcher;
use minicoap::message::{Message, MessageType, Method, Request};
use minicoap::resource::ResourceTable;
use minicoap::server::{CoapServer, ServerHandle, MAX_DATAGRAM_LEN};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Install a per-test subscriber and a stack size large enough for debug builds.
pub fn init() -> tracing::subscriber::DefaultGuard {
    may::config().set_stack_size(0x10000);
    let subscriber = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Config tuned for fast tests: loopback, short sweep, small pools.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        handler_timeout: Duration::from_secs(2),
        piggyback_window: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    };
    config.worker_pool.num_workers = 2;
    config.transmission.ack_timeout = Duration::from_millis(200);
    config.transmission.ack_random_factor = 1.0;
    config.transmission.max_retransmit = 2;
    config
}

pub fn start_server(table: ResourceTable, config: ServerConfig) -> ServerHandle {
    let dispatcher = Dispatcher::new(table, config.dispatcher_config()).unwrap();
    let bind = config.bind;
    CoapServer::new(dispatcher, config).start(bind).unwrap()
}

static NEXT_MID: AtomicU16 = AtomicU16::new(0x4000);

/// Blocking UDP client speaking raw CoAP messages.
pub struct Client {
    socket: UdpSocket,
    server: SocketAddr,
}

impl Client {
    pub fn new(server: SocketAddr) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        Self { socket, server }
    }

    pub fn next_mid() -> u16 {
        NEXT_MID.fetch_add(1, Ordering::Relaxed)
    }

    /// A request message with a fresh message id and a 2-byte token.
    pub fn request(method: Method, path: &str, confirmable: bool) -> Message {
        let mut request = Request::new(method, path);
        request.confirmable = confirmable;
        request.message_id = Self::next_mid();
        request.token = request.message_id.to_be_bytes().to_vec();
        request.to_message()
    }

    pub fn send(&self, msg: &Message) {
        self.send_raw(&msg.encode());
    }

    pub fn send_raw(&self, bytes: &[u8]) {
        self.socket.send_to(bytes, self.server).unwrap();
    }

    /// Next decodable message, or `None` after `timeout`.
    pub fn recv(&self, timeout: Duration) -> Option<Message> {
        self.socket.set_read_timeout(Some(timeout)).unwrap();
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _)) => Some(Message::decode(&buf[..len]).unwrap()),
            Err(_) => None,
        }
    }

    pub fn expect(&self) -> Message {
        self.recv(Duration::from_secs(3))
            .expect("no reply from server")
    }

    pub fn ack(&self, message_id: u16) {
        self.send(&Message::empty_ack(message_id));
    }
}

pub fn is_empty_ack(msg: &Message, message_id: u16) -> bool {
    msg.mtype == MessageType::Acknowledgement && msg.code.is_empty() && msg.message_id == message_id
}
