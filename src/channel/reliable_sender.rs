use std::collections::VecDeque;
use std::sync::Arc;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::channel::sequence::{sequence_diff, SequenceNumber};
use crate::config::TransportConfig;
use crate::packet::{Channel, Packet, PacketType};

struct InFlightPacket {
    packet: Packet,
    /// `None` until the packet is handed out for sending for the first time
    last_sent: Option<Instant>,
}

/// The sending half shared by both reliable channels: assigns sequence numbers, keeps packets
///  until they are acknowledged, re-sends them on timeout, and emits acknowledgements for
///  packets received on the same channel.
pub struct ReliableSender {
    config: Arc<TransportConfig>,
    channel: Channel,
    next_sequence: SequenceNumber,
    /// packets that did not get a sequence number yet because they would be `max_in_flight` or
    ///  more ahead of the oldest unacknowledged packet
    unassigned: VecDeque<(PacketType, Bytes)>,
    /// in order of sequence number assignment
    in_flight: VecDeque<InFlightPacket>,
    pending_acks: Vec<SequenceNumber>,
}
impl ReliableSender {
    pub fn new(config: Arc<TransportConfig>, channel: Channel) -> ReliableSender {
        ReliableSender {
            config,
            channel,
            next_sequence: 0,
            unassigned: Default::default(),
            in_flight: Default::default(),
            pending_acks: Default::default(),
        }
    }

    pub fn num_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn num_unassigned(&self) -> usize {
        self.unassigned.len()
    }

    pub fn queue(&mut self, packet_type: PacketType, payload: Bytes) {
        self.unassigned.push_back((packet_type, payload));
        self.assign_sequence_numbers();
    }

    /// Bounds the distance between the oldest unacknowledged packet and the newest sequence
    ///  number rather than just the number of packets in flight. Otherwise a single lost packet
    ///  could fall behind the receiver's duplicate window while its successors are acknowledged.
    fn has_free_slot(&self) -> bool {
        match self.in_flight.front() {
            None => true,
            Some(oldest) => sequence_diff(self.next_sequence, oldest.packet.sequence) < self.config.max_in_flight as i32,
        }
    }

    fn assign_sequence_numbers(&mut self) {
        while self.has_free_slot() {
            let Some((packet_type, payload)) = self.unassigned.pop_front() else {
                break;
            };

            let packet = Packet::new(packet_type, self.channel, self.next_sequence, payload);
            self.next_sequence = self.next_sequence.wrapping_add(1);
            self.in_flight.push_back(InFlightPacket {
                packet,
                last_sent: None,
            });
        }
    }

    /// removes the acknowledged packet from the in-flight set, returning `false` if there was
    ///  no such packet
    pub fn on_ack(&mut self, sequence: SequenceNumber) -> bool {
        match self.in_flight.iter().position(|p| p.packet.sequence == sequence) {
            Some(idx) => {
                trace!("packet #{} on {:?} acknowledged", sequence, self.channel);
                self.in_flight.remove(idx);
                self.assign_sequence_numbers();
                true
            }
            None => {
                debug!("acknowledgement for packet #{} on {:?} which is not in flight - ignoring", sequence, self.channel);
                false
            }
        }
    }

    pub fn queue_ack(&mut self, sequence: SequenceNumber) {
        self.pending_acks.push(sequence);
    }

    /// acknowledgements first, then packets that were never sent, then packets that are due for
    ///  retransmission
    pub fn pending_outgoing(&mut self, now: Instant) -> Vec<Packet> {
        let channel = self.channel;
        let mut result = self.pending_acks.drain(..)
            .map(|sequence| Packet::ack(channel, sequence))
            .collect::<Vec<_>>();

        for in_flight in self.in_flight.iter_mut() {
            match in_flight.last_sent {
                None => {}
                Some(last_sent) => {
                    if now.duration_since(last_sent) < self.config.retransmit_timeout {
                        continue;
                    }
                    debug!("packet #{} on {:?} not acknowledged after {:?} - re-sending", in_flight.packet.sequence, self.channel, now.duration_since(last_sent));
                }
            }
            in_flight.last_sent = Some(now);
            result.push(in_flight.packet.clone());
        }
        result
    }
}
