//! Z-order (Morton) codes and range skipping
//!
//! A [`Point`] on the 32-bit grid maps to a single `u64` by interleaving the
//! bits of its coordinates: bit `2i` carries bit `i` of `x` and bit `2i + 1`
//! carries bit `i` of `y`. Sorting by code keeps nearby points mostly close
//! together, and [`bigmin`] lets a scan over a sorted code array jump over
//! every run of codes that falls outside a query rectangle.

use crate::{DataError, Result};
use geo::{Coord, Rect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Morton code of a [`Point`]
pub type ZCode = u64;

/// A position on the 32-bit fixed-point grid covering the unit square
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// Size of the fixed-point world along one axis
const WORLD_SIZE: f64 = (1u64 << 32) as f64;

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Convert a normalized coordinate pair to the fixed-point grid
    ///
    /// Components are clamped to `[0, 1]`; NaN maps to 0.
    #[inline]
    pub fn from_normalized(coord: Coord<f64>) -> Self {
        let scale = |v: f64| (v.clamp(0.0, 1.0) * f64::from(u32::MAX)) as u32;
        Self::new(scale(coord.x), scale(coord.y))
    }

    /// Convert back to normalized coordinates in `[0, 1)`
    #[inline]
    pub fn to_normalized(self) -> Coord<f64> {
        Coord {
            x: f64::from(self.x) / WORLD_SIZE,
            y: f64::from(self.y) / WORLD_SIZE,
        }
    }
}

const SHIFTS: [u32; 5] = [16, 8, 4, 2, 1];
const MASKS: [u64; 5] = [
    0x0000_ffff_0000_ffff,
    0x00ff_00ff_00ff_00ff,
    0x0f0f_0f0f_0f0f_0f0f,
    0x3333_3333_3333_3333,
    0x5555_5555_5555_5555,
];

/// Spread the 32 bits of `value` over the even bit positions of a `u64`
#[inline]
pub const fn interleave(value: u32) -> u64 {
    let mut r = value as u64;
    r = (r | (r << SHIFTS[0])) & MASKS[0];
    r = (r | (r << SHIFTS[1])) & MASKS[1];
    r = (r | (r << SHIFTS[2])) & MASKS[2];
    r = (r | (r << SHIFTS[3])) & MASKS[3];
    r = (r | (r << SHIFTS[4])) & MASKS[4];
    r
}

/// Gather the even bits of `value` back into a `u32`
#[inline]
pub const fn deinterleave(value: u64) -> u32 {
    let mut r = value & MASKS[4];
    r = (r | (r >> SHIFTS[4])) & MASKS[3];
    r = (r | (r >> SHIFTS[3])) & MASKS[2];
    r = (r | (r >> SHIFTS[2])) & MASKS[1];
    r = (r | (r >> SHIFTS[1])) & MASKS[0];
    r = (r | (r >> SHIFTS[0])) & 0x0000_0000_ffff_ffff;
    r as u32
}

#[inline]
pub const fn code(point: Point) -> ZCode {
    interleave(point.x) | (interleave(point.y) << 1)
}

#[inline]
pub const fn decode(code: ZCode) -> Point {
    Point {
        x: deinterleave(code),
        y: deinterleave(code >> 1),
    }
}

/// `1000…0` on one axis, aligned to bit 63
const LOAD_ONE_ZEROS: u64 = interleave(1 << 31) << 1;
/// `0111…1` on one axis, aligned to bit 63
const LOAD_ZERO_ONES: u64 = interleave(!(1 << 31)) << 1;
/// Every bit of the axis owning the odd positions
const ODD_BITS: u64 = interleave(u32::MAX) << 1;

/// Overwrite the bits of `code` at `bit_pos` and below that belong to the same
/// axis as `bit_pos` with `pattern`, keeping all other bits.
///
/// Named after the LOAD operation of Tropf & Herzog (1981), "Multidimensional
/// Range Search in Dynamically Balanced Trees".
#[inline]
const fn load(pattern: u64, bit_pos: u32, code: u64) -> u64 {
    let pattern = pattern >> (u64::BITS - 1 - bit_pos);
    let kept = code & ((ODD_BITS >> (bit_pos % 2)) | (!1u64 << bit_pos) | pattern);
    kept | pattern
}

/// Smallest code greater than `div` that lies inside the rectangle spanned by
/// the corner codes `min` and `max`.
///
/// `min` and `max` must be the codes of the minimal and maximal corners, and
/// `div` must be below `max`. Violations are caller bugs and panic.
pub fn bigmin(div: ZCode, mut min: ZCode, mut max: ZCode) -> ZCode {
    assert!(div < max, "bigmin: division point {div:#x} is not below max {max:#x}");
    assert!(min <= max, "bigmin: min {min:#x} exceeds max {max:#x}");
    let (lo, hi) = (decode(min), decode(max));
    assert!(
        lo.x <= hi.x && lo.y <= hi.y,
        "bigmin: {min:#x} and {max:#x} are not min/max rectangle corners"
    );

    let mut candidate = max;
    for bit_pos in (0..u64::BITS).rev() {
        let bits = (((div >> bit_pos) & 1) << 2) | (((min >> bit_pos) & 1) << 1) | ((max >> bit_pos) & 1);
        match bits {
            0b000 | 0b111 => {}
            0b001 => {
                candidate = load(LOAD_ONE_ZEROS, bit_pos, min);
                max = load(LOAD_ZERO_ONES, bit_pos, max);
            }
            0b101 => min = load(LOAD_ONE_ZEROS, bit_pos, min),
            0b011 => return min,
            0b100 => return candidate,
            _ => panic!("bigmin: min {min:#x} above max {max:#x} at bit {bit_pos}"),
        }
    }
    candidate
}

/// Query rectangle expressed by the codes of its minimal and maximal corners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRange {
    min: ZCode,
    max: ZCode,
    lo: Point,
    hi: Point,
}

impl CodeRange {
    /// Rectangle spanned by two opposite corners in any order
    pub fn new(a: Point, b: Point) -> Self {
        let lo = Point::new(a.x.min(b.x), a.y.min(b.y));
        let hi = Point::new(a.x.max(b.x), a.y.max(b.y));
        Self {
            min: code(lo),
            max: code(hi),
            lo,
            hi,
        }
    }

    /// The whole world
    pub fn world() -> Self {
        Self::new(Point::new(0, 0), Point::new(u32::MAX, u32::MAX))
    }

    /// Convert a viewport in normalized coordinates
    ///
    /// Parts of the viewport outside the unit square are clamped away.
    pub fn from_viewport(viewport: &Rect<f64>) -> Result<Self> {
        let (min, max) = (viewport.min(), viewport.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(DataError::InvalidViewport(format!(
                "non-finite corner in {viewport:?}"
            )));
        }
        Ok(Self::new(Point::from_normalized(min), Point::from_normalized(max)))
    }

    #[inline]
    pub fn min(&self) -> ZCode {
        self.min
    }

    #[inline]
    pub fn max(&self) -> ZCode {
        self.max
    }

    /// Minimal corner
    #[inline]
    pub fn lo(&self) -> Point {
        self.lo
    }

    /// Maximal corner
    #[inline]
    pub fn hi(&self) -> Point {
        self.hi
    }

    #[inline]
    pub fn contains_point(&self, point: Point) -> bool {
        (self.lo.x..=self.hi.x).contains(&point.x) && (self.lo.y..=self.hi.y).contains(&point.y)
    }

    #[inline]
    pub fn contains(&self, code: ZCode) -> bool {
        self.contains_point(decode(code))
    }

    /// Next code after `code` that may lie inside the rectangle
    ///
    /// `code` must be below [`max`](Self::max).
    #[inline]
    pub fn next_inside(&self, code: ZCode) -> ZCode {
        bigmin(code, self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: [u32; 16] = [
        0b0000, 0b0001, 0b0010, 0b0011, 0b0100, 0b0101, 0b0110, 0b0111, 0b1000, 0b1001, 0b1010,
        0b1011, 0b1100, 0b1101, 0b1110, 0b1111,
    ];
    const INTERLEAVED: [u64; 16] = [
        0b0000_0000,
        0b0000_0001,
        0b0000_0100,
        0b0000_0101,
        0b0001_0000,
        0b0001_0001,
        0b0001_0100,
        0b0001_0101,
        0b0100_0000,
        0b0100_0001,
        0b0100_0100,
        0b0100_0101,
        0b0101_0000,
        0b0101_0001,
        0b0101_0100,
        0b0101_0101,
    ];
    const GROUP_SIZE: u32 = 4;

    fn xorshift(state: &mut u64) -> u64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        *state
    }

    #[test]
    fn test_interleave_known_value() {
        assert_eq!(interleave(0b0000_1001), 0b0100_0001);
        assert_eq!(interleave(0b0000_1001), 65);
    }

    #[test]
    fn test_groups_of_4_bits_interleaved_correctly() {
        for group_pos in 0..32 / GROUP_SIZE {
            for (value, interleaved) in VALUES.iter().zip(INTERLEAVED) {
                assert_eq!(
                    interleave(value << (GROUP_SIZE * group_pos)),
                    interleaved << (2 * GROUP_SIZE * group_pos),
                    "value {value:#b} at group {group_pos}"
                );
            }
        }
    }

    #[test]
    fn test_groups_of_4_bits_deinterleaved_correctly() {
        for group_pos in 0..32 / GROUP_SIZE {
            for (value, interleaved) in VALUES.iter().zip(INTERLEAVED) {
                assert_eq!(
                    deinterleave(interleaved << (2 * GROUP_SIZE * group_pos)),
                    value << (GROUP_SIZE * group_pos),
                    "value {value:#b} at group {group_pos}"
                );
            }
        }
    }

    #[test]
    fn test_encode_and_decode_point_is_identity() {
        let mut state = 0x2545_f491_4f6c_dd1d;
        for _ in 0..1000 {
            let r = xorshift(&mut state);
            let point = Point::new(r as u32, (r >> 32) as u32);
            assert_eq!(decode(code(point)), point);
        }
        let corner = Point::new(u32::MAX, u32::MAX);
        assert_eq!(code(corner), u64::MAX);
        assert_eq!(decode(u64::MAX), corner);
    }

    #[test]
    fn test_y_occupies_odd_bits() {
        assert_eq!(code(Point::new(1, 0)), 0b01);
        assert_eq!(code(Point::new(0, 1)), 0b10);
    }

    #[test]
    fn test_bigmin_known_value() {
        // Rect (0,0)..(2,2); 5 decodes to (3,0), 6 to (2,1)
        assert_eq!(bigmin(5, 0, 12), 6);
    }

    #[test]
    fn test_bigmin_exhaustive_small_grid() {
        const N: u32 = 8;
        for x0 in 0..N {
            for x1 in x0..N {
                for y0 in 0..N {
                    for y1 in y0..N {
                        let range = CodeRange::new(Point::new(x0, y0), Point::new(x1, y1));
                        for div in range.min()..range.max() {
                            let next = bigmin(div, range.min(), range.max());
                            assert!(next > div, "bigmin({div}) = {next} for {range:?}");
                            assert!(range.contains(next), "bigmin({div}) = {next} for {range:?}");
                            assert!(
                                !(div + 1..next).any(|c| range.contains(c)),
                                "bigmin({div}) = {next} skipped a code of {range:?}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_bigmin_random_large_rectangles() {
        let mut state = 0x9e37_79b9_7f4a_7c15;
        for _ in 0..200 {
            let a = Point::new(xorshift(&mut state) as u32, xorshift(&mut state) as u32);
            let b = Point::new(xorshift(&mut state) as u32, xorshift(&mut state) as u32);
            let range = CodeRange::new(a, b);
            if range.min() == range.max() {
                continue;
            }
            let div = range.min() + xorshift(&mut state) % (range.max() - range.min());
            let next = bigmin(div, range.min(), range.max());
            assert!(next > div);
            assert!(range.contains(next));
        }
    }

    #[test]
    #[should_panic(expected = "division point")]
    fn test_bigmin_rejects_division_point_at_max() {
        bigmin(12, 0, 12);
    }

    #[test]
    #[should_panic(expected = "not min/max rectangle corners")]
    fn test_bigmin_rejects_swapped_corners() {
        // code((1,0)) = 1 < code((0,1)) = 2 but x decreases
        bigmin(0, 1, 2);
    }

    #[test]
    fn test_code_range_orders_corners() {
        let range = CodeRange::new(Point::new(5, 1), Point::new(2, 7));
        assert_eq!(range.lo(), Point::new(2, 1));
        assert_eq!(range.hi(), Point::new(5, 7));
        assert!(range.contains(code(Point::new(3, 3))));
        assert!(!range.contains(code(Point::new(6, 3))));
        assert!(range.min() <= range.max());
    }

    #[test]
    fn test_code_range_from_viewport() {
        let viewport = Rect::new(Coord { x: 0.25, y: 0.5 }, Coord { x: 0.75, y: 1.5 });
        let range = CodeRange::from_viewport(&viewport).unwrap();
        assert_eq!(range.hi().y, u32::MAX);
        assert!(range.contains_point(Point::from_normalized(Coord { x: 0.5, y: 0.75 })));
        assert!(!range.contains_point(Point::from_normalized(Coord { x: 0.1, y: 0.75 })));
    }

    #[test]
    fn test_code_range_rejects_nan_viewport() {
        let viewport = Rect::new(Coord { x: f64::NAN, y: 0.0 }, Coord { x: 1.0, y: 1.0 });
        assert!(matches!(
            CodeRange::from_viewport(&viewport),
            Err(DataError::InvalidViewport(_))
        ));
    }

    #[test]
    fn test_normalized_conversion() {
        let point = Point::from_normalized(Coord { x: 0.5, y: -3.0 });
        assert_eq!(point.y, 0);
        let back = point.to_normalized();
        assert!((back.x - 0.5).abs() < 1e-9);
        assert_eq!(Point::from_normalized(Coord { x: 1.0, y: 2.0 }), Point::new(u32::MAX, u32::MAX));
    }
}
