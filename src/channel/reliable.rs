use std::collections::VecDeque;
use std::sync::Arc;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::duplicate_window::DuplicateWindow;
use crate::channel::reliable_sender::ReliableSender;
use crate::channel::DeliveryChannel;
use crate::config::TransportConfig;
use crate::packet::{Channel, Packet, PacketType};

/// Every packet is re-sent until it is acknowledged, and every received packet is delivered once,
///  in whatever order it arrives.
pub struct ReliableChannel {
    sender: ReliableSender,
    received: DuplicateWindow,
    incoming: VecDeque<Packet>,
}
impl ReliableChannel {
    pub fn new(config: Arc<TransportConfig>) -> ReliableChannel {
        ReliableChannel {
            received: DuplicateWindow::new(config.duplicate_window_size),
            sender: ReliableSender::new(config, Channel::Reliable),
            incoming: Default::default(),
        }
    }

    pub fn num_in_flight(&self) -> usize {
        self.sender.num_in_flight()
    }
}

impl DeliveryChannel for ReliableChannel {
    fn queue_outgoing(&mut self, packet_type: PacketType, payload: Bytes) {
        self.sender.queue(packet_type, payload);
    }

    fn queue_incoming(&mut self, packet: Packet) {
        if packet.packet_type == PacketType::Ack {
            self.sender.on_ack(packet.sequence);
            return;
        }

        // always acknowledge: a duplicate usually means that our previous ack got lost
        self.sender.queue_ack(packet.sequence);

        if self.received.insert(packet.sequence) {
            self.incoming.push_back(packet);
        }
        else {
            debug!("duplicate packet #{} on reliable channel - discarding", packet.sequence);
        }
    }

    fn pending_outgoing(&mut self, now: Instant) -> Vec<Packet> {
        self.sender.pending_outgoing(now)
    }

    fn pending_incoming(&mut self) -> Vec<Packet> {
        self.incoming.drain(..).collect()
    }
}
