//! # minicoap
//!
//! **minicoap** is a small, coroutine-powered CoAP ([RFC 7252](https://www.rfc-editor.org/rfc/rfc7252))
//! resource server built on the `may` runtime.
//!
//! ## Architecture
//!
//! - **[`ordered`]** - an always-sorted container with a pluggable ordering rule
//! - **[`exchange`]** - in-flight confirmable exchanges ordered by deadline,
//!   retransmission parameters and duplicate suppression
//! - **[`resource`]** - the resource table and the handler capability
//! - **[`dispatcher`]** - resolves a request to a resource, runs it on a worker
//!   pool and maps every outcome to a response code
//! - **[`message`]** - CoAP message types and the binary codec
//! - **[`server`]** - the UDP shell: receive loop, piggybacked and separate
//!   responses, retransmission sweep
//! - **[`middleware`]** - access logging and request metrics around dispatch
//! - **[`config`]**, **[`logging`]**, **[`runtime_config`]** - ambient setup
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Shell as Server shell<br/>(receive loop)
//!     participant Registry as ExchangeRegistry
//!     participant Dispatcher
//!     participant Worker as Resource worker<br/>(coroutine)
//!
//!     Client->>Shell: CON GET /temp (mid 0x1234)
//!     Shell->>Registry: check_duplicate(peer, mid)
//!     alt Duplicate
//!         Registry-->>Shell: cached reply
//!         Shell-->>Client: replay
//!     end
//!     Shell->>Dispatcher: dispatch(request)
//!     Dispatcher->>Dispatcher: lookup path (4.04), method (4.05), Accept (4.06)
//!     Dispatcher->>Worker: ResourceCall via channel
//!     Worker-->>Dispatcher: value / error / panic
//!     Dispatcher-->>Shell: 2.05 "42.5" or 5.xx
//!     alt Within piggyback window
//!         Shell-->>Client: ACK 2.05 (mid 0x1234)
//!     else Slow handler
//!         Shell-->>Client: empty ACK
//!         Shell->>Registry: schedule separate CON
//!         Shell-->>Client: CON 2.05 (retransmitted until ACK)
//!     end
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use minicoap::config::ServerConfig;
//! use minicoap::dispatcher::Dispatcher;
//! use minicoap::resource::{FixedReading, ResourceTable, TemperatureResource};
//! use minicoap::server::CoapServer;
//!
//! let config = ServerConfig::default();
//! let mut table = ResourceTable::new();
//! table.register("/temp", TemperatureResource::new(FixedReading(21.5))).unwrap();
//!
//! let dispatcher = Dispatcher::new(table, config.dispatcher_config()).unwrap();
//! let handle = CoapServer::new(dispatcher, config).start("127.0.0.1:5683").unwrap();
//! handle.stop();
//! ```
//!
//! ## Runtime Considerations
//!
//! minicoap uses the `may` coroutine runtime, not tokio. Handlers run on
//! worker coroutines and may block on I/O; coroutine stack size is
//! configurable via `MINICOAP_STACK_SIZE`.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod exchange;
pub mod ids;
pub mod logging;
pub mod message;
pub mod middleware;
pub mod ordered;
pub mod resource;
pub mod runtime_config;
pub mod server;
pub mod worker_pool;

pub use dispatcher::Dispatcher;
pub use exchange::ExchangeRegistry;
pub use ordered::OrderedContainer;
pub use resource::{ResourceHandler, ResourceTable};
pub use server::CoapServer;
