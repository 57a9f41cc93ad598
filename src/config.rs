use std::time::Duration;
use anyhow::bail;

/// Sequence numbers are u16 and compared by signed difference, so every window that is
///  interpreted relative to a sequence number must stay well inside half the sequence space.
pub const MAX_WINDOW_SIZE: usize = 16384;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// an unacknowledged packet on a reliable channel is re-sent when it was last sent at least
    ///  this long ago
    pub retransmit_timeout: Duration,
    /// upper bound for the sequence number distance between the oldest unacknowledged packet
    ///  and the newest packet sent on a reliable channel. Packets beyond this are queued without
    ///  a sequence number until the oldest one is acknowledged. Must not exceed
    ///  `duplicate_window_size`.
    pub max_in_flight: usize,
    /// number of early packets an ordered channel buffers while waiting for a missing predecessor
    pub reorder_buffer_size: usize,
    /// number of recent sequence numbers the reliable channel remembers for duplicate
    ///  suppression. Must be a power of two.
    pub duplicate_window_size: usize,

    pub ping_interval: Duration,
    /// a session is dropped if nothing was received from the peer for this long
    pub idle_timeout: Duration,

    /// no fragmentation: payloads that do not fit into a single datagram are refused
    pub max_datagram_size: usize,
}

impl TransportConfig {
    pub fn new() -> TransportConfig {
        TransportConfig {
            retransmit_timeout: Duration::from_millis(200),
            max_in_flight: 1024,
            reorder_buffer_size: 256,
            duplicate_window_size: 1024,
            ping_interval: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(10),
            max_datagram_size: 1500,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_in_flight == 0 || self.max_in_flight > MAX_WINDOW_SIZE {
            bail!("max_in_flight must be in 1..={}, was {}", MAX_WINDOW_SIZE, self.max_in_flight);
        }
        if self.reorder_buffer_size == 0 || self.reorder_buffer_size > MAX_WINDOW_SIZE {
            bail!("reorder_buffer_size must be in 1..={}, was {}", MAX_WINDOW_SIZE, self.reorder_buffer_size);
        }
        if !self.duplicate_window_size.is_power_of_two() || self.duplicate_window_size > MAX_WINDOW_SIZE {
            bail!("duplicate_window_size must be a power of two <= {}, was {}", MAX_WINDOW_SIZE, self.duplicate_window_size);
        }
        if self.max_in_flight > self.duplicate_window_size {
            bail!("max_in_flight ({}) must not exceed duplicate_window_size ({})", self.max_in_flight, self.duplicate_window_size);
        }
        if self.retransmit_timeout.is_zero() {
            bail!("retransmit_timeout must not be zero");
        }
        if self.idle_timeout <= self.ping_interval {
            bail!("idle_timeout ({:?}) must be longer than ping_interval ({:?})", self.idle_timeout, self.ping_interval);
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}
