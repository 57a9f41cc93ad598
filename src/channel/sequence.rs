//! Sequence numbers are u16 and wrap around. Ordering between two sequence numbers is defined by
//!  their signed difference, i.e. `b` follows `a` if it is less than half the sequence space
//!  ahead of it. This makes 0 the successor of 65535.

pub type SequenceNumber = u16;

/// The signed distance from `b` to `a`: positive if `a` is ahead of `b`, negative if it is behind.
///
/// Widened to i32 so that negating the result can not overflow.
pub fn sequence_diff(a: SequenceNumber, b: SequenceNumber) -> i32 {
    a.wrapping_sub(b) as i16 as i32
}

pub fn sequence_greater_than(a: SequenceNumber, b: SequenceNumber) -> bool {
    sequence_diff(a, b) > 0
}

pub fn sequence_less_than(a: SequenceNumber, b: SequenceNumber) -> bool {
    sequence_diff(a, b) < 0
}
