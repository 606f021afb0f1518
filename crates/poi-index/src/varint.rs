//! LEB128 variable-length coding of unsigned 64-bit integers
//!
//! Each value is written as 7-bit groups, least significant first, with the
//! continuation bit (`0x80`) set on every byte except the last one of the
//! value. Decoding never fails: a truncated trailing value is dropped and bits
//! beyond the 64th of an over-long value are discarded.

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7f;

/// Number of bytes `value` occupies once encoded: `max(1, ceil(bits / 7))`
#[inline]
pub const fn encoded_len(value: u64) -> usize {
    let bits = (u64::BITS - value.leading_zeros()) as usize;
    if bits == 0 { 1 } else { bits.div_ceil(7) }
}

/// Append the encoding of `values` to `out`
///
/// Returns the number of bytes written.
pub fn encode<I>(values: I, out: &mut Vec<u8>) -> usize
where
    I: IntoIterator<Item = u64>,
{
    let start = out.len();
    for mut value in values {
        while value > u64::from(PAYLOAD) {
            out.push(CONTINUATION | (value as u8 & PAYLOAD));
            value >>= 7;
        }
        out.push(value as u8);
    }
    out.len() - start
}

/// Decode every complete value in `bytes`
pub fn decode(bytes: &[u8]) -> Vec<u64> {
    Varints::new(bytes).collect()
}

/// Decode at most `count` values from `bytes` into `out`
///
/// Returns the number of bytes consumed, i.e. the offset where the rest of the
/// stream starts. Used to read a length-prefixed section of a larger stream.
pub fn decode_n(bytes: &[u8], count: usize, out: &mut Vec<u64>) -> usize {
    let mut values = Varints::new(bytes);
    out.extend(values.by_ref().take(count));
    values.position()
}

/// Streaming decoder over a byte slice
#[derive(Debug, Clone)]
pub struct Varints<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Varints<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Offset of the first byte not consumed yet
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not consumed yet
    #[inline]
    pub fn remainder(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

impl Iterator for Varints<'_> {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        while let Some(&byte) = self.bytes.get(self.pos) {
            self.pos += 1;
            if shift < u64::BITS {
                value |= u64::from(byte & PAYLOAD) << shift;
            }
            shift = shift.saturating_add(7);
            if byte & CONTINUATION == 0 {
                return Some(value);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.bytes.len() - self.pos;
        (left.div_ceil(10), Some(left))
    }
}
