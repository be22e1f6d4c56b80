use super::dedup::{DedupCache, DedupKey, Seen, DEFAULT_DEDUP_CAPACITY};
use super::transmission::TransmissionParams;
use crate::ordered::{ContainerError, OrderedContainer, OrderingRule};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// One confirmable message awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Message id the peer will ACK
    pub message_id: u16,
    /// Token of the request this message answers
    pub token: Vec<u8>,
    /// Where to retransmit
    pub peer: SocketAddr,
    /// Encoded message, resent verbatim
    pub bytes: Vec<u8>,
    /// When the next retransmission is due
    pub deadline: Instant,
    /// Current retransmission timeout, doubled on each retry
    pub timeout: Duration,
    /// Retransmissions so far
    pub retries: u32,
}

impl Exchange {
    /// A fresh exchange first sent at `now`, with a randomized initial timeout.
    #[must_use]
    pub fn new(
        message_id: u16,
        token: Vec<u8>,
        peer: SocketAddr,
        bytes: Vec<u8>,
        now: Instant,
        params: &TransmissionParams,
    ) -> Self {
        let timeout = params.initial_timeout();
        Self {
            message_id,
            token,
            peer,
            bytes,
            deadline: now + timeout,
            timeout,
            retries: 0,
        }
    }
}

/// Orders exchanges by next deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByDeadline;

impl OrderingRule<Exchange> for ByDeadline {
    fn compare(&self, a: &Exchange, b: &Exchange) -> Option<Ordering> {
        Some(a.deadline.cmp(&b.deadline))
    }
}

/// Registry failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A message id is already in flight.
    #[error("message id {0} is already in flight")]
    DuplicateMessageId(u16),
    /// The deadline index rejected an exchange.
    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Outcome of one [`ExchangeRegistry::retransmission_sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Exchanges resent and rescheduled
    pub retransmitted: usize,
    /// Exchanges dropped after exhausting their retries
    pub expired: usize,
}

#[derive(Debug)]
struct Inner {
    exchanges: OrderedContainer<Exchange, ByDeadline>,
    dedup: DedupCache,
}

impl Inner {
    fn index_of(&self, message_id: u16) -> Option<usize> {
        self.exchanges.position(|e| e.message_id == message_id)
    }

    fn take(&mut self, message_id: u16) -> Option<Exchange> {
        let index = self.index_of(message_id)?;
        self.exchanges.remove_at(index).ok()
    }
}

/// In-flight exchanges plus the duplicate-suppression cache.
///
/// Every operation takes the one lock, so remove-and-reinsert sequences such
/// as [`reschedule`](Self::reschedule) are atomic with respect to a
/// concurrent [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct ExchangeRegistry {
    inner: Mutex<Inner>,
    params: TransmissionParams,
}

impl ExchangeRegistry {
    /// Registry whose dedup window is the transmission span of `params`.
    #[must_use]
    pub fn new(params: TransmissionParams) -> Self {
        Self::with_dedup(params, params.max_transmit_span(), DEFAULT_DEDUP_CAPACITY)
    }

    #[must_use]
    pub fn with_dedup(params: TransmissionParams, window: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                exchanges: OrderedContainer::new(ByDeadline),
                dedup: DedupCache::new(window, capacity),
            }),
            params,
        }
    }

    #[must_use]
    pub fn params(&self) -> &TransmissionParams {
        &self.params
    }

    /// Start tracking an exchange.
    pub fn schedule(&self, exchange: Exchange) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock();
        if inner.index_of(exchange.message_id).is_some() {
            return Err(RegistryError::DuplicateMessageId(exchange.message_id));
        }
        debug!(
            message_id = exchange.message_id,
            peer = %exchange.peer,
            timeout_ms = exchange.timeout.as_millis() as u64,
            "Exchange scheduled"
        );
        inner.exchanges.insert(exchange)?;
        Ok(())
    }

    /// Snapshot of every exchange due at or before `now`, earliest first.
    #[must_use]
    pub fn due_before(&self, now: Instant) -> Vec<Exchange> {
        let inner = self.inner.lock();
        inner
            .exchanges
            .iter()
            .take_while(|e| e.deadline <= now)
            .cloned()
            .collect()
    }

    /// Move an exchange to `new_deadline`, counting a retry and doubling its
    /// timeout. Returns `false` if it is no longer tracked.
    pub fn reschedule(&self, message_id: u16, new_deadline: Instant) -> bool {
        let mut inner = self.inner.lock();
        let Some(mut exchange) = inner.take(message_id) else {
            return false;
        };
        exchange.retries += 1;
        exchange.timeout = exchange.timeout.saturating_mul(2);
        exchange.deadline = new_deadline;
        match inner.exchanges.insert(exchange) {
            Ok(_) => true,
            Err(e) => {
                warn!(message_id, error = %e, "Failed to reschedule exchange");
                false
            }
        }
    }

    /// Stop tracking an exchange (ACK or RST received). Returns whether it was tracked.
    pub fn cancel(&self, message_id: u16) -> bool {
        let removed = self.inner.lock().take(message_id).is_some();
        if removed {
            debug!(message_id, "Exchange acknowledged");
        }
        removed
    }

    /// Remove an exchange that ran out of retries.
    ///
    /// `None` means it was cancelled in the meantime; calling this twice is harmless.
    pub fn finalize(&self, message_id: u16) -> Option<Exchange> {
        self.inner.lock().take(message_id)
    }

    /// Resend due exchanges that have retries left, and drop the rest.
    ///
    /// `send` is only called for exchanges that were still tracked at the
    /// moment they were rescheduled, so a concurrent cancel suppresses the
    /// resend. Each expiry is counted once even if the sweep races a cancel.
    pub fn retransmission_sweep<F>(&self, now: Instant, mut send: F) -> SweepReport
    where
        F: FnMut(&Exchange),
    {
        let mut report = SweepReport::default();
        for exchange in self.due_before(now) {
            if exchange.retries < self.params.max_retransmit {
                let next = now + exchange.timeout.saturating_mul(2);
                if self.reschedule(exchange.message_id, next) {
                    debug!(
                        message_id = exchange.message_id,
                        peer = %exchange.peer,
                        retry = exchange.retries + 1,
                        "Retransmitting"
                    );
                    send(&exchange);
                    report.retransmitted += 1;
                }
            } else if let Some(expired) = self.finalize(exchange.message_id) {
                warn!(
                    message_id = expired.message_id,
                    peer = %expired.peer,
                    retries = expired.retries,
                    "Exchange expired without acknowledgement"
                );
                report.expired += 1;
            }
        }
        report
    }

    /// Earliest deadline, if anything is in flight.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.lock().exchanges.first().map(|e| e.deadline)
    }

    #[must_use]
    pub fn contains(&self, message_id: u16) -> bool {
        self.inner.lock().index_of(message_id).is_some()
    }

    /// Number of exchanges in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().exchanges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duplicate check for an incoming message.
    pub fn check_duplicate(&self, key: DedupKey, now: Instant) -> Seen {
        self.inner.lock().dedup.check(key, now)
    }

    /// Remember the reply sent for `key` so a duplicate can be answered with it.
    pub fn record_reply(&self, key: DedupKey, reply: Vec<u8>) -> bool {
        self.inner.lock().dedup.record_reply(key, reply)
    }

    /// Drop dedup entries older than the window.
    pub fn prune_duplicates(&self, now: Instant) -> usize {
        self.inner.lock().dedup.prune(now)
    }

    /// Message ids currently remembered for duplicate detection.
    #[must_use]
    pub fn dedup_len(&self) -> usize {
        self.inner.lock().dedup.len()
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new(TransmissionParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(message_id: u16, deadline: Instant) -> Exchange {
        Exchange {
            message_id,
            token: vec![0xab],
            peer: "127.0.0.1:40000".parse().unwrap(),
            bytes: vec![0x40, 0x45, 0, message_id as u8],
            deadline,
            timeout: Duration::from_secs(2),
            retries: 0,
        }
    }

    #[test]
    fn test_due_before_is_deadline_ordered_snapshot() {
        let registry = ExchangeRegistry::default();
        let t0 = Instant::now();
        registry.schedule(exchange(3, t0 + Duration::from_secs(3))).unwrap();
        registry.schedule(exchange(1, t0 + Duration::from_secs(1))).unwrap();
        registry.schedule(exchange(2, t0 + Duration::from_secs(2))).unwrap();

        let due: Vec<u16> = registry
            .due_before(t0 + Duration::from_secs(2))
            .iter()
            .map(|e| e.message_id)
            .collect();
        assert_eq!(due, vec![1, 2]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_message_id_rejected() {
        let registry = ExchangeRegistry::default();
        let t0 = Instant::now();
        registry.schedule(exchange(7, t0)).unwrap();
        assert_eq!(
            registry.schedule(exchange(7, t0)),
            Err(RegistryError::DuplicateMessageId(7))
        );
    }

    #[test]
    fn test_reschedule_bumps_retry_and_doubles_timeout() {
        let registry = ExchangeRegistry::default();
        let t0 = Instant::now();
        registry.schedule(exchange(5, t0)).unwrap();

        assert!(registry.reschedule(5, t0 + Duration::from_secs(4)));
        let moved = registry.due_before(t0 + Duration::from_secs(4));
        assert_eq!(moved[0].retries, 1);
        assert_eq!(moved[0].timeout, Duration::from_secs(4));

        assert!(registry.cancel(5));
        assert!(!registry.reschedule(5, t0));
    }

    #[test]
    fn test_cancel_and_finalize_are_idempotent() {
        let registry = ExchangeRegistry::default();
        registry.schedule(exchange(9, Instant::now())).unwrap();
        assert!(registry.finalize(9).is_some());
        assert!(registry.finalize(9).is_none());
        assert!(!registry.cancel(9));
    }

    #[test]
    fn test_sweep_retransmits_then_expires() {
        let params = TransmissionParams {
            max_retransmit: 1,
            ..TransmissionParams::default()
        };
        let registry = ExchangeRegistry::new(params);
        let t0 = Instant::now();
        registry.schedule(exchange(1, t0)).unwrap();

        let mut sent = Vec::new();
        let report = registry.retransmission_sweep(t0, |e| sent.push(e.message_id));
        assert_eq!(report, SweepReport { retransmitted: 1, expired: 0 });
        assert_eq!(sent, vec![1]);

        let later = registry.next_deadline().unwrap();
        let report = registry.retransmission_sweep(later, |e| sent.push(e.message_id));
        assert_eq!(report, SweepReport { retransmitted: 0, expired: 1 });
        assert!(registry.is_empty());
        assert_eq!(sent, vec![1]);
    }
}
