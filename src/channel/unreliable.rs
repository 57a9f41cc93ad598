use std::collections::VecDeque;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::debug;

use crate::channel::DeliveryChannel;
use crate::packet::{Channel, Packet, PacketType};

/// Fire and forget: no sequence numbers, no acknowledgement, no filtering. Every received packet
///  is delivered, duplicates included.
#[derive(Default)]
pub struct UnreliableChannel {
    outgoing: VecDeque<Packet>,
    incoming: VecDeque<Packet>,
}
impl UnreliableChannel {
    pub fn new() -> UnreliableChannel {
        Default::default()
    }
}

impl DeliveryChannel for UnreliableChannel {
    fn queue_outgoing(&mut self, packet_type: PacketType, payload: Bytes) {
        self.outgoing.push_back(Packet::new(packet_type, Channel::None, 0, payload));
    }

    fn queue_incoming(&mut self, packet: Packet) {
        if packet.packet_type == PacketType::Ack {
            debug!("acknowledgement on unreliable channel - ignoring");
            return;
        }
        self.incoming.push_back(packet);
    }

    fn pending_outgoing(&mut self, _now: Instant) -> Vec<Packet> {
        self.outgoing.drain(..).collect()
    }

    fn pending_incoming(&mut self) -> Vec<Packet> {
        self.incoming.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use super::*;

    #[rstest]
    fn test_outgoing_sent_once() {
        let mut channel = UnreliableChannel::new();
        channel.queue_outgoing(PacketType::UserData, Bytes::from_static(b"a"));
        channel.queue_outgoing(PacketType::Ping, Bytes::new());

        let sent = channel.pending_outgoing(Instant::now());
        assert_eq!(sent, vec![
            Packet::new(PacketType::UserData, Channel::None, 0, Bytes::from_static(b"a")),
            Packet::new(PacketType::Ping, Channel::None, 0, Bytes::new()),
        ]);
        assert!(channel.pending_outgoing(Instant::now()).is_empty());
    }

    #[rstest]
    fn test_incoming_passes_duplicates() {
        let mut channel = UnreliableChannel::new();
        let packet = Packet::new(PacketType::UserData, Channel::None, 42, Bytes::from_static(b"x"));
        channel.queue_incoming(packet.clone());
        channel.queue_incoming(packet.clone());
        channel.queue_incoming(Packet::ack(Channel::None, 42));

        assert_eq!(channel.pending_incoming(), vec![packet.clone(), packet]);
        assert!(channel.pending_incoming().is_empty());
    }
}
