use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Reliability timing for confirmable messages (RFC 7252 §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TransmissionParams {
    /// Base wait for an ACK before the first retransmission
    #[serde(rename = "ack_timeout_ms", deserialize_with = "crate::config::duration_ms")]
    pub ack_timeout: Duration,
    /// Upper bound multiplier for the randomized initial timeout
    pub ack_random_factor: f64,
    /// Retransmissions before giving up
    pub max_retransmit: u32,
}

impl Default for TransmissionParams {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            ack_random_factor: 1.5,
            max_retransmit: 4,
        }
    }
}

impl TransmissionParams {
    /// Time from the first transmission to the last retransmission.
    ///
    /// 45 s with the defaults; also how long a message id must be remembered
    /// for duplicate detection.
    #[must_use]
    pub fn max_transmit_span(&self) -> Duration {
        let backoff = (1u32 << self.max_retransmit.min(31)) - 1;
        let secs = self.ack_timeout.as_secs_f64() * f64::from(backoff) * self.ack_random_factor;
        // Saturate instead of panicking on values validation would reject
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Draw the first timeout uniformly in
    /// `[ack_timeout, ack_timeout * ack_random_factor]`.
    #[must_use]
    pub fn initial_timeout(&self) -> Duration {
        let low = self.ack_timeout.as_secs_f64();
        let high = low * self.ack_random_factor.max(1.0);
        if !high.is_finite() || high <= low {
            return self.ack_timeout;
        }
        Duration::try_from_secs_f64(rand::thread_rng().gen_range(low..=high))
            .unwrap_or(self.ack_timeout)
    }
}
