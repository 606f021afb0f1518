//! Delta coding of non-decreasing integer sequences
//!
//! A sorted sequence is stored as its first value followed by successive
//! differences, each written with [`varint`](crate::varint). Dense sorted code
//! arrays shrink to one or two bytes per element this way.
//!
//! Differences and the running sum use wrapping arithmetic, so an unsorted
//! input still round-trips exactly; it only loses compactness.

use crate::varint::{self, Varints};

/// Append the delta encoding of `sorted` to `out`
///
/// Returns the number of bytes written.
pub fn encode(sorted: &[u64], out: &mut Vec<u8>) -> usize {
    let differences = sorted.iter().scan(0u64, |prev, &value| {
        let diff = value.wrapping_sub(*prev);
        *prev = value;
        Some(diff)
    });
    varint::encode(differences, out)
}

/// Decode a whole delta-encoded stream
pub fn decode(bytes: &[u8]) -> Vec<u64> {
    Deltas::new(bytes).collect()
}

/// Decode at most `count` values into `out`, returning the bytes consumed
pub fn decode_n(bytes: &[u8], count: usize, out: &mut Vec<u64>) -> usize {
    let mut values = Deltas::new(bytes);
    out.reserve(count.min(bytes.len()));
    out.extend(values.by_ref().take(count));
    values.position()
}

/// Streaming decoder reconstructing values from their differences
#[derive(Debug, Clone)]
pub struct Deltas<'a> {
    differences: Varints<'a>,
    accum: u64,
}

impl<'a> Deltas<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            differences: Varints::new(bytes),
            accum: 0,
        }
    }

    /// Offset of the first byte not consumed yet
    #[inline]
    pub fn position(&self) -> usize {
        self.differences.position()
    }
}

impl Iterator for Deltas<'_> {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        let diff = self.differences.next()?;
        self.accum = self.accum.wrapping_add(diff);
        Some(self.accum)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.differences.size_hint()
    }
}
