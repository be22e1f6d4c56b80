//! # Exchange Module
//!
//! Reliability bookkeeping for the protocol shell.
//!
//! - [`ExchangeRegistry`] tracks confirmable messages the server sent and has
//!   not seen acknowledged, ordered by retransmission deadline
//! - [`DedupCache`] remembers recently seen `(peer, message id)` pairs and the
//!   reply sent for each, so retransmitted requests are answered without
//!   running the handler again
//! - [`TransmissionParams`] holds the RFC 7252 timing constants
//!
//! Both orderings live in [`crate::ordered::OrderedContainer`]s guarded by a
//! single `parking_lot::Mutex`.
//!
//! ## Sweep
//!
//! ```rust
//! use minicoap::exchange::{Exchange, ExchangeRegistry, TransmissionParams};
//! use std::time::{Duration, Instant};
//!
//! let registry = ExchangeRegistry::new(TransmissionParams::default());
//! let now = Instant::now();
//! let peer = "127.0.0.1:5683".parse().unwrap();
//! registry
//!     .schedule(Exchange::new(1, vec![], peer, vec![0x40, 0x45, 0, 1], now, registry.params()))
//!     .unwrap();
//!
//! // Nothing is due before the initial timeout
//! let report = registry.retransmission_sweep(now, |_| {});
//! assert_eq!(report.retransmitted, 0);
//!
//! let report = registry.retransmission_sweep(now + Duration::from_secs(4), |_| {});
//! assert_eq!(report.retransmitted, 1);
//! ```

mod dedup;
mod registry;
mod transmission;

pub use dedup::{DedupCache, DedupKey, Seen, DEFAULT_DEDUP_CAPACITY};
pub use registry::{ByDeadline, Exchange, ExchangeRegistry, RegistryError, SweepReport};
pub use transmission::TransmissionParams;
