use std::sync::Arc;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::trace;

use crate::channel::reliable_sender::ReliableSender;
use crate::channel::reorder_buffer::{OverflowPolicy, ReorderBuffer, ReorderOutcome};
use crate::channel::DeliveryChannel;
use crate::config::TransportConfig;
use crate::packet::{Channel, Packet, PacketType};

/// Retransmission like [crate::channel::reliable::ReliableChannel], delivery like
///  [crate::channel::in_order::InOrderChannel]: every packet is delivered exactly once, in order
///  and without gaps. A lost packet stalls everything behind it until its retransmission arrives.
pub struct ReliableInOrderChannel {
    sender: ReliableSender,
    reorder_buffer: ReorderBuffer,
}
impl ReliableInOrderChannel {
    pub fn new(config: Arc<TransportConfig>) -> ReliableInOrderChannel {
        ReliableInOrderChannel {
            // A packet is acknowledged once it is buffered, so it must never be evicted
            //  afterwards. Rejecting it instead leaves it to the sender's retransmission.
            reorder_buffer: ReorderBuffer::new(config.reorder_buffer_size, OverflowPolicy::Reject),
            sender: ReliableSender::new(config, Channel::ReliableInOrder),
        }
    }

    pub fn num_in_flight(&self) -> usize {
        self.sender.num_in_flight()
    }
}

impl DeliveryChannel for ReliableInOrderChannel {
    fn queue_outgoing(&mut self, packet_type: PacketType, payload: Bytes) {
        self.sender.queue(packet_type, payload);
    }

    fn queue_incoming(&mut self, packet: Packet) {
        if packet.packet_type == PacketType::Ack {
            self.sender.on_ack(packet.sequence);
            return;
        }

        let sequence = packet.sequence;
        match self.reorder_buffer.insert(packet) {
            ReorderOutcome::Released | ReorderOutcome::Buffered | ReorderOutcome::Stale => {
                self.sender.queue_ack(sequence);
            }
            ReorderOutcome::Rejected => {
                trace!("not acknowledging rejected packet #{} - waiting for retransmission", sequence);
            }
        }
    }

    fn pending_outgoing(&mut self, now: Instant) -> Vec<Packet> {
        self.sender.pending_outgoing(now)
    }

    fn pending_incoming(&mut self) -> Vec<Packet> {
        self.reorder_buffer.take_ready()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use rstest::rstest;
    use super::*;

    fn new_channel(reorder_buffer_size: usize) -> ReliableInOrderChannel {
        let mut config = TransportConfig::new();
        config.retransmit_timeout = Duration::from_millis(100);
        config.reorder_buffer_size = reorder_buffer_size;
        ReliableInOrderChannel::new(Arc::new(config))
    }

    fn packet(sequence: u16) -> Packet {
        Packet::new(PacketType::UserData, Channel::ReliableInOrder, sequence, Bytes::from(format!("#{}", sequence)))
    }

    fn sequences(packets: Vec<Packet>) -> Vec<u16> {
        packets.into_iter().map(|p| p.sequence).collect()
    }

    fn acks(packets: Vec<Packet>) -> Vec<u16> {
        packets.into_iter()
            .filter(|p| p.packet_type == PacketType::Ack)
            .map(|p| p.sequence)
            .collect()
    }

    #[rstest]
    fn test_in_order_delivery_and_acks() {
        let mut channel = new_channel(16);

        channel.queue_incoming(packet(1));
        channel.queue_incoming(packet(2));
        assert!(channel.pending_incoming().is_empty());

        channel.queue_incoming(packet(0));
        assert_eq!(sequences(channel.pending_incoming()), vec![0, 1, 2]);
        assert_eq!(acks(channel.pending_outgoing(Instant::now())), vec![1, 2, 0]);
    }

    #[rstest]
    fn test_duplicate_delivered_once_and_reacknowledged() {
        let mut channel = new_channel(16);
        channel.queue_incoming(packet(0));
        channel.queue_incoming(packet(0));
        assert_eq!(sequences(channel.pending_incoming()), vec![0]);
        assert_eq!(acks(channel.pending_outgoing(Instant::now())), vec![0, 0]);
    }

    #[rstest]
    fn test_full_buffer_rejects_without_ack() {
        let mut channel = new_channel(1);

        channel.queue_incoming(packet(2));
        channel.queue_incoming(packet(1));
        assert_eq!(acks(channel.pending_outgoing(Instant::now())), vec![2]);

        channel.queue_incoming(packet(0));
        assert_eq!(sequences(channel.pending_incoming()), vec![0]);

        // the retransmission of #1 now closes the gap
        channel.queue_incoming(packet(1));
        assert_eq!(sequences(channel.pending_incoming()), vec![1, 2]);
        assert_eq!(acks(channel.pending_outgoing(Instant::now())), vec![0, 1]);
    }

    #[rstest]
    fn test_retransmission_and_ack() {
        let mut channel = new_channel(16);
        let t0 = Instant::now();

        channel.queue_outgoing(PacketType::UserData, Bytes::from_static(b"a"));
        channel.queue_outgoing(PacketType::UserData, Bytes::from_static(b"b"));
        assert_eq!(sequences(channel.pending_outgoing(t0)), vec![0, 1]);

        channel.queue_incoming(Packet::ack(Channel::ReliableInOrder, 1));
        assert_eq!(channel.num_in_flight(), 1);
        assert_eq!(sequences(channel.pending_outgoing(t0 + Duration::from_millis(100))), vec![0]);
    }

    #[rstest]
    fn test_wraparound() {
        let mut channel = new_channel(16);
        for seq in 0..65534u16 {
            channel.queue_incoming(packet(seq));
        }
        channel.pending_incoming();
        channel.pending_outgoing(Instant::now());

        channel.queue_incoming(packet(1));
        channel.queue_incoming(packet(0));
        channel.queue_incoming(packet(65535));
        channel.queue_incoming(packet(65534));
        assert_eq!(sequences(channel.pending_incoming()), vec![65534, 65535, 0, 1]);
    }
}
