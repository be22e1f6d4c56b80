use crate::ordered::{ByKey, OrderedContainer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Default number of remembered message ids.
pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

/// Identifies a message for duplicate detection: message ids are only unique per peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub peer: SocketAddr,
    pub message_id: u16,
}

impl DedupKey {
    #[must_use]
    pub fn new(peer: SocketAddr, message_id: u16) -> Self {
        Self { peer, message_id }
    }
}

/// Result of a duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    /// First sighting; the key is now remembered.
    New,
    /// Seen before. Carries the encoded reply when one was recorded, `None`
    /// while the original is still being processed.
    Duplicate(Option<Vec<u8>>),
}

#[derive(Debug)]
struct Entry {
    expires_at: Instant,
    reply: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
struct Expiry {
    at: Instant,
    key: DedupKey,
}

type ByExpiry = ByKey<fn(&Expiry) -> Instant>;

fn expiry_instant(e: &Expiry) -> Instant {
    e.at
}

/// Bounded cache of recently seen message ids with their replies.
///
/// Expiry order is kept in an [`OrderedContainer`] so pruning only looks at
/// the front. When the cache is full the entry closest to expiry (the oldest)
/// is evicted.
#[derive(Debug)]
pub struct DedupCache {
    entries: HashMap<DedupKey, Entry>,
    expiries: OrderedContainer<Expiry, ByExpiry>,
    window: Duration,
    capacity: usize,
}

impl DedupCache {
    #[must_use]
    pub fn new(window: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            expiries: OrderedContainer::with_capacity(
                ByKey(expiry_instant as fn(&Expiry) -> Instant),
                capacity,
            ),
            window,
            capacity,
        }
    }

    /// Look `key` up, remembering it if it is new.
    pub fn check(&mut self, key: DedupKey, now: Instant) -> Seen {
        self.prune(now);
        if let Some(entry) = self.entries.get(&key) {
            trace!(peer = %key.peer, message_id = key.message_id, "Duplicate message");
            return Seen::Duplicate(entry.reply.clone());
        }

        while self.entries.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }

        let expires_at = now + self.window;
        self.entries.insert(
            key,
            Entry {
                expires_at,
                reply: None,
            },
        );
        if let Err(e) = self.expiries.insert(Expiry {
            at: expires_at,
            key,
        }) {
            // Instants are totally ordered; reaching this is a bug
            warn!(error = %e, "Dedup expiry index rejected an entry");
        }
        Seen::New
    }

    /// Attach the encoded reply for later replay. Returns `false` if the key
    /// has already been forgotten.
    pub fn record_reply(&mut self, key: DedupKey, reply: Vec<u8>) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.reply = Some(reply);
                true
            }
            None => false,
        }
    }

    /// Forget every entry whose window has passed. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant) -> usize {
        let mut dropped = 0;
        while let Some(front) = self.expiries.first().copied() {
            if front.at > now {
                break;
            }
            if self.expiries.remove_at(0).is_ok() && self.remove_if_current(front) {
                dropped += 1;
            }
        }
        dropped
    }

    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict_oldest(&mut self) -> bool {
        match self.expiries.remove_at(0) {
            Ok(oldest) => {
                trace!(
                    peer = %oldest.key.peer,
                    message_id = oldest.key.message_id,
                    "Dedup cache full, evicting oldest"
                );
                self.remove_if_current(oldest);
                true
            }
            Err(_) => false,
        }
    }

    fn remove_if_current(&mut self, expiry: Expiry) -> bool {
        match self.entries.get(&expiry.key) {
            Some(entry) if entry.expires_at == expiry.at => {
                self.entries.remove(&expiry.key);
                true
            }
            _ => false,
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(45), DEFAULT_DEDUP_CAPACITY)
    }
}
