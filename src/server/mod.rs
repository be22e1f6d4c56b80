//! # Server Module
//!
//! The UDP protocol shell around the [`crate::dispatcher::Dispatcher`].
//!
//! ## Coroutines
//!
//! - **receive loop**: decodes datagrams, answers pings and resets, cancels
//!   acknowledged exchanges, filters duplicates and starts a request coroutine
//!   per new request
//! - **request coroutines**: dispatch and reply, piggybacked in the ACK when
//!   the handler finishes within `piggyback_window`, otherwise as a separate
//!   confirmable response tracked by the [`crate::exchange::ExchangeRegistry`]
//! - **sweep**: every `sweep_interval`, retransmits due exchanges and prunes
//!   the duplicate cache
//!
//! ## Usage
//!
//! ```rust,no_run
//! use minicoap::config::ServerConfig;
//! use minicoap::dispatcher::Dispatcher;
//! use minicoap::resource::{ResourceTable, TemperatureResource, ThermalZoneSource};
//! use minicoap::server::CoapServer;
//!
//! let config = ServerConfig::from_env().unwrap();
//! let mut table = ResourceTable::new();
//! table.register("/temp", TemperatureResource::new(ThermalZoneSource::default())).unwrap();
//! let dispatcher = Dispatcher::new(table, config.dispatcher_config()).unwrap();
//!
//! let handle = CoapServer::new(dispatcher, config.clone()).start(config.bind).unwrap();
//! println!("listening on {}", handle.local_addr());
//! handle.join().ok();
//! ```

mod handle;
mod service;
mod transport;

pub use handle::ServerHandle;
pub use service::CoapServer;
pub use transport::Transport;

/// Largest datagram the shell reads; anything longer is truncated by the socket.
pub const MAX_DATAGRAM_LEN: usize = 1152;
