use std::collections::VecDeque;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::reorder_buffer::{OverflowPolicy, ReorderBuffer};
use crate::channel::sequence::SequenceNumber;
use crate::channel::DeliveryChannel;
use crate::config::TransportConfig;
use crate::packet::{Channel, Packet, PacketType};

/// Sequenced but not reliable: packets that arrive are delivered in sequence order, late packets
///  are dropped, and nothing is ever re-sent. A lost packet therefore blocks the packets
///  buffered behind it until they are evicted by closer ones.
pub struct InOrderChannel {
    next_sequence: SequenceNumber,
    outgoing: VecDeque<Packet>,
    reorder_buffer: ReorderBuffer,
}
impl InOrderChannel {
    pub fn new(config: &TransportConfig) -> InOrderChannel {
        InOrderChannel {
            next_sequence: 0,
            outgoing: Default::default(),
            reorder_buffer: ReorderBuffer::new(config.reorder_buffer_size, OverflowPolicy::EvictFurthest),
        }
    }
}

impl DeliveryChannel for InOrderChannel {
    fn queue_outgoing(&mut self, packet_type: PacketType, payload: Bytes) {
        self.outgoing.push_back(Packet::new(packet_type, Channel::InOrder, self.next_sequence, payload));
        self.next_sequence = self.next_sequence.wrapping_add(1);
    }

    fn queue_incoming(&mut self, packet: Packet) {
        if packet.packet_type == PacketType::Ack {
            debug!("acknowledgement on in-order channel - ignoring");
            return;
        }
        self.reorder_buffer.insert(packet);
    }

    fn pending_outgoing(&mut self, _now: Instant) -> Vec<Packet> {
        self.outgoing.drain(..).collect()
    }

    fn pending_incoming(&mut self) -> Vec<Packet> {
        self.reorder_buffer.take_ready()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    fn packet(sequence: u16) -> Packet {
        Packet::new(PacketType::UserData, Channel::InOrder, sequence, Bytes::from(vec![sequence as u8]))
    }

    fn sequences(packets: Vec<Packet>) -> Vec<u16> {
        packets.into_iter().map(|p| p.sequence).collect()
    }

    #[rstest]
    fn test_outgoing_sequence_numbers() {
        let mut channel = InOrderChannel::new(&TransportConfig::new());
        for _ in 0..3 {
            channel.queue_outgoing(PacketType::UserData, Bytes::new());
        }
        assert_eq!(sequences(channel.pending_outgoing(Instant::now())), vec![0, 1, 2]);
        // no retransmission
        assert!(channel.pending_outgoing(Instant::now()).is_empty());

        channel.queue_outgoing(PacketType::UserData, Bytes::new());
        assert_eq!(sequences(channel.pending_outgoing(Instant::now())), vec![3]);
    }

    #[rstest]
    fn test_two_zero_one() {
        let mut channel = InOrderChannel::new(&TransportConfig::new());

        channel.queue_incoming(packet(2));
        assert!(channel.pending_incoming().is_empty());

        channel.queue_incoming(packet(0));
        assert_eq!(sequences(channel.pending_incoming()), vec![0]);

        channel.queue_incoming(packet(1));
        assert_eq!(sequences(channel.pending_incoming()), vec![1, 2]);
    }

    #[rstest]
    fn test_duplicate_delivered_once() {
        let mut channel = InOrderChannel::new(&TransportConfig::new());
        channel.queue_incoming(packet(0));
        channel.queue_incoming(packet(0));
        channel.queue_incoming(packet(1));
        channel.queue_incoming(packet(1));
        assert_eq!(sequences(channel.pending_incoming()), vec![0, 1]);
        channel.queue_incoming(packet(1));
        assert!(channel.pending_incoming().is_empty());
    }

    #[rstest]
    fn test_lost_packet_is_never_skipped() {
        let mut channel = InOrderChannel::new(&TransportConfig::new());
        channel.queue_incoming(packet(0));
        for seq in 2..10 {
            channel.queue_incoming(packet(seq));
        }
        assert_eq!(sequences(channel.pending_incoming()), vec![0]);
        assert!(channel.pending_incoming().is_empty());
    }
}
