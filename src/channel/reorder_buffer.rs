use std::collections::VecDeque;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::channel::sequence::{sequence_diff, sequence_less_than, SequenceNumber};
use crate::packet::Packet;

/// What to do with an early packet when the buffer is full
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// drop whichever packet is furthest ahead - possibly the arriving packet itself
    EvictFurthest,
    /// refuse the arriving packet, leaving buffered packets untouched
    Reject,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReorderOutcome {
    /// the packet was the next expected one; it and possibly buffered successors are ready
    Released,
    /// the packet is ahead of the next expected one and waits for its predecessors
    Buffered,
    /// the packet is behind the next expected one, i.e. a duplicate or a late arrival
    Stale,
    /// the packet did not fit into the buffer
    Rejected,
}

/// Delivers packets in sequence order, holding back packets that arrive before their predecessors.
///
/// There is no skipping of gaps: if a predecessor never arrives, the packets after it are never
///  released. They are only ever displaced by packet eviction.
pub struct ReorderBuffer {
    next_expected: SequenceNumber,
    capacity: usize,
    policy: OverflowPolicy,
    buffered: FxHashMap<SequenceNumber, Packet>,
    ready: VecDeque<Packet>,
}
impl ReorderBuffer {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> ReorderBuffer {
        ReorderBuffer {
            next_expected: 0,
            capacity,
            policy,
            buffered: Default::default(),
            ready: Default::default(),
        }
    }

    pub fn next_expected(&self) -> SequenceNumber {
        self.next_expected
    }

    pub fn num_buffered(&self) -> usize {
        self.buffered.len()
    }

    pub fn insert(&mut self, packet: Packet) -> ReorderOutcome {
        let distance = sequence_diff(packet.sequence, self.next_expected);

        if sequence_less_than(packet.sequence, self.next_expected) {
            debug!("packet #{} is behind next expected #{} - discarding", packet.sequence, self.next_expected);
            return ReorderOutcome::Stale;
        }

        if distance == 0 {
            self.release(packet);
            return ReorderOutcome::Released;
        }

        if self.buffered.contains_key(&packet.sequence) {
            trace!("packet #{} is already buffered", packet.sequence);
            self.buffered.insert(packet.sequence, packet);
            return ReorderOutcome::Buffered;
        }

        if self.buffered.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Reject => {
                    debug!("reorder buffer is full - rejecting packet #{}", packet.sequence);
                    return ReorderOutcome::Rejected;
                }
                OverflowPolicy::EvictFurthest => {
                    let furthest = self.furthest_buffered();
                    match furthest {
                        Some(furthest) if sequence_diff(furthest, self.next_expected) > distance => {
                            debug!("reorder buffer is full - evicting packet #{} in favor of #{}", furthest, packet.sequence);
                            self.buffered.remove(&furthest);
                        }
                        _ => {
                            debug!("reorder buffer is full - dropping packet #{}", packet.sequence);
                            return ReorderOutcome::Rejected;
                        }
                    }
                }
            }
        }

        trace!("buffering packet #{}, waiting for #{}", packet.sequence, self.next_expected);
        self.buffered.insert(packet.sequence, packet);
        ReorderOutcome::Buffered
    }

    fn furthest_buffered(&self) -> Option<SequenceNumber> {
        self.buffered.keys()
            .copied()
            .max_by_key(|&seq| sequence_diff(seq, self.next_expected))
    }

    fn release(&mut self, packet: Packet) {
        self.ready.push_back(packet);
        self.next_expected = self.next_expected.wrapping_add(1);

        while let Some(successor) = self.buffered.remove(&self.next_expected) {
            trace!("releasing buffered packet #{}", successor.sequence);
            self.ready.push_back(successor);
            self.next_expected = self.next_expected.wrapping_add(1);
        }
    }

    /// takes all packets that are ready for delivery, in sequence order
    pub fn take_ready(&mut self) -> Vec<Packet> {
        self.ready.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;
    use crate::packet::{Channel, PacketType};
    use super::*;

    fn packet(sequence: u16) -> Packet {
        Packet::new(PacketType::UserData, Channel::InOrder, sequence, Bytes::from(format!("p{}", sequence)))
    }

    fn sequences(packets: &[Packet]) -> Vec<u16> {
        packets.iter().map(|p| p.sequence).collect()
    }

    #[rstest]
    fn test_cascade_release() {
        let mut buffer = ReorderBuffer::new(16, OverflowPolicy::EvictFurthest);

        assert_eq!(buffer.insert(packet(2)), ReorderOutcome::Buffered);
        assert!(buffer.take_ready().is_empty());

        assert_eq!(buffer.insert(packet(0)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![0]);

        assert_eq!(buffer.insert(packet(1)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![1, 2]);
        assert_eq!(buffer.next_expected(), 3);
        assert_eq!(buffer.num_buffered(), 0);
    }

    #[rstest]
    fn test_stale_and_duplicates() {
        let mut buffer = ReorderBuffer::new(16, OverflowPolicy::Reject);

        assert_eq!(buffer.insert(packet(0)), ReorderOutcome::Released);
        assert_eq!(buffer.insert(packet(0)), ReorderOutcome::Stale);
        assert_eq!(buffer.insert(packet(3)), ReorderOutcome::Buffered);
        assert_eq!(buffer.insert(packet(3)), ReorderOutcome::Buffered);
        assert_eq!(buffer.num_buffered(), 1);

        assert_eq!(buffer.insert(packet(1)), ReorderOutcome::Released);
        assert_eq!(buffer.insert(packet(2)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![0, 1, 2, 3]);
    }

    #[rstest]
    fn test_wraparound() {
        let mut buffer = ReorderBuffer::new(16, OverflowPolicy::EvictFurthest);
        buffer.next_expected = 65534;

        assert_eq!(buffer.insert(packet(0)), ReorderOutcome::Buffered);
        assert_eq!(buffer.insert(packet(65535)), ReorderOutcome::Buffered);
        assert_eq!(buffer.insert(packet(65533)), ReorderOutcome::Stale);
        assert_eq!(buffer.insert(packet(65534)), ReorderOutcome::Released);

        assert_eq!(sequences(&buffer.take_ready()), vec![65534, 65535, 0]);
        assert_eq!(buffer.next_expected(), 1);
    }

    #[rstest]
    fn test_evict_furthest() {
        let mut buffer = ReorderBuffer::new(2, OverflowPolicy::EvictFurthest);

        assert_eq!(buffer.insert(packet(5)), ReorderOutcome::Buffered);
        assert_eq!(buffer.insert(packet(3)), ReorderOutcome::Buffered);
        // further ahead than everything buffered: the arriving packet is the one to go
        assert_eq!(buffer.insert(packet(9)), ReorderOutcome::Rejected);
        // closer than #5, so #5 is evicted
        assert_eq!(buffer.insert(packet(1)), ReorderOutcome::Buffered);
        assert_eq!(buffer.num_buffered(), 2);

        assert_eq!(buffer.insert(packet(0)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![0, 1]);
        assert_eq!(buffer.insert(packet(2)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![2, 3]);
        // #5 was evicted, so #4 does not cascade any further
        assert_eq!(buffer.insert(packet(4)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![4]);
    }

    #[rstest]
    fn test_reject_policy_keeps_buffer() {
        let mut buffer = ReorderBuffer::new(1, OverflowPolicy::Reject);

        assert_eq!(buffer.insert(packet(5)), ReorderOutcome::Buffered);
        assert_eq!(buffer.insert(packet(1)), ReorderOutcome::Rejected);
        assert_eq!(buffer.num_buffered(), 1);
        // the expected packet is never rejected, regardless of buffer pressure
        assert_eq!(buffer.insert(packet(0)), ReorderOutcome::Released);
        assert_eq!(sequences(&buffer.take_ready()), vec![0]);
    }

    #[rstest]
    #[case::in_order(vec![0, 1, 2, 3, 4, 5])]
    #[case::reversed(vec![5, 4, 3, 2, 1, 0])]
    #[case::interleaved(vec![1, 0, 3, 2, 5, 4])]
    #[case::with_duplicates(vec![2, 2, 0, 0, 5, 1, 4, 3, 1])]
    fn test_delivery_is_ordered(#[case] arrivals: Vec<u16>) {
        let mut buffer = ReorderBuffer::new(16, OverflowPolicy::Reject);
        let mut delivered = Vec::new();
        for seq in arrivals {
            buffer.insert(packet(seq));
            delivered.extend(sequences(&buffer.take_ready()));
        }
        assert_eq!(delivered, vec![0, 1, 2, 3, 4, 5]);
    }
}
