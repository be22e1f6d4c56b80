//! # Dispatcher Module
//!
//! Turns a decoded [`crate::message::Request`] into exactly one
//! [`crate::message::Response`].
//!
//! ## Request Flow
//!
//! 1. Middleware `before` hooks (may short-circuit)
//! 2. Exact path lookup, 4.04 on a miss
//! 3. Method check, 4.05 when the resource does not answer the method
//! 4. Content negotiation, 4.06 when Accept names anything but text/plain
//! 5. The request goes to the resource's worker pool; the dispatcher waits at
//!    most `handler_timeout`
//! 6. Middleware `after` hooks observe the response
//!
//! ## Error Handling
//!
//! - `HandlerError::Unavailable`, a timeout, a full queue or a dead pool
//!   answer 5.03
//! - `HandlerError::Failed` and handler panics answer 5.00
//!
//! None of these stop the server.
//!
//! ```rust
//! use minicoap::dispatcher::{Dispatcher, DispatcherConfig};
//! use minicoap::message::{Method, Request, ResponseCode};
//! use minicoap::resource::{FixedReading, ResourceTable, TemperatureResource};
//!
//! let mut table = ResourceTable::new();
//! table.register("/temp", TemperatureResource::new(FixedReading(42.5))).unwrap();
//! let dispatcher = Dispatcher::new(table, DispatcherConfig::default()).unwrap();
//!
//! let resp = dispatcher.dispatch(Request::new(Method::Get, "/temp"));
//! assert_eq!(resp.status, ResponseCode::Content);
//! assert_eq!(resp.payload_str().as_deref(), Some("42.5"));
//! ```

mod core;

pub use self::core::{Dispatcher, DispatcherConfig, OFFERED_FORMAT};
