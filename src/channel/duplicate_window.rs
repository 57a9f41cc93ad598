use bit_set::BitSet;

use crate::channel::sequence::{sequence_diff, sequence_greater_than, SequenceNumber};

/// Remembers which of the most recent `size` sequence numbers were seen, relative to the highest
///  sequence number seen so far. Anything older than that window counts as already seen.
///
/// `size` must be a power of two so that the bit index is stable across the wrap-around.
pub struct DuplicateWindow {
    size: usize,
    latest: Option<SequenceNumber>,
    seen: BitSet,
}
impl DuplicateWindow {
    pub fn new(size: usize) -> DuplicateWindow {
        assert!(size.is_power_of_two(), "duplicate window size must be a power of two");
        DuplicateWindow {
            size,
            latest: None,
            seen: BitSet::with_capacity(size),
        }
    }

    fn index(&self, sequence: SequenceNumber) -> usize {
        sequence as usize & (self.size - 1)
    }

    /// registers a sequence number, returning `true` if it was not seen before
    pub fn insert(&mut self, sequence: SequenceNumber) -> bool {
        let latest = match self.latest {
            None => {
                self.latest = Some(sequence);
                let idx = self.index(sequence);
                self.seen.insert(idx);
                return true;
            }
            Some(latest) => latest,
        };

        let diff = sequence_diff(sequence, latest);
        if sequence_greater_than(sequence, latest) {
            // the window moves forward: forget what was recorded for the slots it moves into
            if diff as usize >= self.size {
                self.seen.clear();
            }
            else {
                for i in 1..=diff {
                    let idx = self.index(latest.wrapping_add(i as u16));
                    self.seen.remove(idx);
                }
            }
            self.latest = Some(sequence);
            let idx = self.index(sequence);
            self.seen.insert(idx);
            return true;
        }

        if (-diff) as usize >= self.size {
            return false;
        }

        let idx = self.index(sequence);
        self.seen.insert(idx)
    }
}
