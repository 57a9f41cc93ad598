//! The four delivery guarantees. Each remote peer owns exactly one instance of each strategy in a
//!  [ChannelSet], indexed by [Channel].
//!
//! | channel           | sequenced | re-sent | duplicates filtered | ordered delivery |
//! |-------------------|-----------|---------|---------------------|------------------|
//! | `None`            | no        | no      | no                  | no               |
//! | `InOrder`         | yes       | no      | yes                 | yes              |
//! | `Reliable`        | yes       | yes     | yes                 | no               |
//! | `ReliableInOrder` | yes       | yes     | yes                 | yes              |

pub mod sequence;
pub mod reorder_buffer;
pub mod duplicate_window;
pub mod reliable_sender;
pub mod unreliable;
pub mod in_order;
pub mod reliable;
pub mod reliable_in_order;

use std::sync::Arc;
use bytes::Bytes;
use tokio::time::Instant;

use crate::channel::in_order::InOrderChannel;
use crate::channel::reliable::ReliableChannel;
use crate::channel::reliable_in_order::ReliableInOrderChannel;
use crate::channel::unreliable::UnreliableChannel;
use crate::config::TransportConfig;
use crate::packet::{Channel, Packet, PacketType};

/// Per-channel bookkeeping for both directions of a single remote peer.
///
/// The `pending_*` functions drain: they return a snapshot of everything that is due at the time
///  of the call, and the channel forgets about it (except for in-flight packets of reliable
///  channels, which stay until they are acknowledged).
pub trait DeliveryChannel {
    fn queue_outgoing(&mut self, packet_type: PacketType, payload: Bytes);

    fn queue_incoming(&mut self, packet: Packet);

    fn pending_outgoing(&mut self, now: Instant) -> Vec<Packet>;

    fn pending_incoming(&mut self) -> Vec<Packet>;
}

pub enum ChannelState {
    Unreliable(UnreliableChannel),
    InOrder(InOrderChannel),
    Reliable(ReliableChannel),
    ReliableInOrder(ReliableInOrderChannel),
}
impl ChannelState {
    pub fn new(channel: Channel, config: &Arc<TransportConfig>) -> ChannelState {
        match channel {
            Channel::None => ChannelState::Unreliable(UnreliableChannel::new()),
            Channel::InOrder => ChannelState::InOrder(InOrderChannel::new(config)),
            Channel::Reliable => ChannelState::Reliable(ReliableChannel::new(config.clone())),
            Channel::ReliableInOrder => ChannelState::ReliableInOrder(ReliableInOrderChannel::new(config.clone())),
        }
    }

    /// unacknowledged packets, always 0 for channels without retransmission
    pub fn num_in_flight(&self) -> usize {
        match self {
            ChannelState::Reliable(c) => c.num_in_flight(),
            ChannelState::ReliableInOrder(c) => c.num_in_flight(),
            ChannelState::Unreliable(_) | ChannelState::InOrder(_) => 0,
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            ChannelState::Unreliable(_) => Channel::None,
            ChannelState::InOrder(_) => Channel::InOrder,
            ChannelState::Reliable(_) => Channel::Reliable,
            ChannelState::ReliableInOrder(_) => Channel::ReliableInOrder,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $c:ident => $call:expr) => {
        match $self {
            ChannelState::Unreliable($c) => $call,
            ChannelState::InOrder($c) => $call,
            ChannelState::Reliable($c) => $call,
            ChannelState::ReliableInOrder($c) => $call,
        }
    }
}

impl DeliveryChannel for ChannelState {
    fn queue_outgoing(&mut self, packet_type: PacketType, payload: Bytes) {
        dispatch!(self, c => c.queue_outgoing(packet_type, payload))
    }

    fn queue_incoming(&mut self, packet: Packet) {
        dispatch!(self, c => c.queue_incoming(packet))
    }

    fn pending_outgoing(&mut self, now: Instant) -> Vec<Packet> {
        dispatch!(self, c => c.pending_outgoing(now))
    }

    fn pending_incoming(&mut self) -> Vec<Packet> {
        dispatch!(self, c => c.pending_incoming())
    }
}

/// Exactly one [ChannelState] per [Channel], stored at the channel's index
pub struct ChannelSet {
    channels: [ChannelState; 4],
}
impl ChannelSet {
    pub fn new(config: &Arc<TransportConfig>) -> ChannelSet {
        ChannelSet {
            channels: Channel::ALL.map(|channel| ChannelState::new(channel, config)),
        }
    }

    pub fn get_mut(&mut self, channel: Channel) -> &mut ChannelState {
        &mut self.channels[channel.index()]
    }

    pub fn get(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel.index()]
    }

    /// incoming packets of all channels, in channel order
    pub fn drain_incoming(&mut self) -> Vec<Packet> {
        self.channels.iter_mut()
            .flat_map(|c| c.pending_incoming())
            .collect()
    }

    /// outgoing packets of all channels, in channel order
    pub fn drain_outgoing(&mut self, now: Instant) -> Vec<Packet> {
        self.channels.iter_mut()
            .flat_map(|c| c.pending_outgoing(now))
            .collect()
    }
}
