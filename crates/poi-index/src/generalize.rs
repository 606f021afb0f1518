//! Zoom-level generalization of sorted Morton code arrays
//!
//! The world is divided into a square grid whose cell edge halves with every
//! zoom step. Because a grid cell is an aligned square, all of its codes share
//! the same high bits and form one contiguous run in a sorted array, so a
//! single forward scan can cluster a viewport cell by cell. Runs of codes that
//! leave the viewport (Z-order is not axis order) are skipped with
//! [`bigmin`](crate::morton::bigmin).

use crate::morton::{self, CodeRange, Point, ZCode};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bits per axis of the fixed-point world
pub const WORLD_SIZE_LOG2: u32 = 32;
/// Map tiles are 256 px wide
pub const TILE_PIXEL_SIZE_LOG2: u32 = 8;
/// A cluster covers a 32 px square on screen
pub const CELL_PIXEL_SIZE_LOG2: u32 = 5;
/// Finest zoom level; a cell is a single grid unit there
pub const MAX_ZOOM: u8 = (WORLD_SIZE_LOG2 - (TILE_PIXEL_SIZE_LOG2 - CELL_PIXEL_SIZE_LOG2)) as u8;

/// A cluster of points produced for one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointGroup {
    /// Code of the centroid of the member points
    pub representative: ZCode,
    /// Number of member points, at least 1
    pub count: u32,
}

/// Clustering grid for one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomGrid {
    zoom: u8,
    cell_log2: u32,
}

impl ZoomGrid {
    /// Grid for `zoom`, clamped to [`MAX_ZOOM`]
    pub fn new(zoom: u8) -> Self {
        let zoom = zoom.min(MAX_ZOOM);
        let cell_log2 =
            WORLD_SIZE_LOG2 - (TILE_PIXEL_SIZE_LOG2 - CELL_PIXEL_SIZE_LOG2 + u32::from(zoom));
        Self { zoom, cell_log2 }
    }

    #[inline]
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Cell edge in fixed-point units
    #[inline]
    pub fn cell_size(&self) -> u64 {
        1 << self.cell_log2
    }

    /// Cell edge in normalized units
    #[inline]
    pub fn cell_size_normalized(&self) -> f64 {
        self.cell_size() as f64 / (1u64 << WORLD_SIZE_LOG2) as f64
    }

    /// Bits shared by every code of a cell
    #[inline]
    pub fn cell_mask(&self) -> u64 {
        u64::MAX << (2 * self.cell_log2)
    }

    /// Last code of the cell containing `code`
    #[inline]
    pub fn cell_end(&self, code: ZCode) -> ZCode {
        code | !self.cell_mask()
    }
}

/// Running centroid of a cell's members
///
/// Wide accumulators keep the mean exact; the reported count saturates at
/// `u32::MAX` like [`Marker::merged`](crate::Marker::merged).
#[derive(Default)]
struct Centroid {
    x_sum: u128,
    y_sum: u128,
    count: u64,
}

impl Centroid {
    #[inline]
    fn add(&mut self, point: Point) {
        self.x_sum += u128::from(point.x);
        self.y_sum += u128::from(point.y);
        self.count += 1;
    }

    fn finish(self) -> Option<PointGroup> {
        if self.count == 0 {
            return None;
        }
        let count = u128::from(self.count);
        let centroid = Point::new((self.x_sum / count) as u32, (self.y_sum / count) as u32);
        Some(PointGroup {
            representative: morton::code(centroid),
            count: u32::try_from(self.count).unwrap_or(u32::MAX),
        })
    }
}

/// Cluster the points of `points` (sorted ascending) inside `range`
///
/// Emits one [`PointGroup`] per non-empty grid cell, in ascending code order.
pub fn generalize(points: &[ZCode], range: &CodeRange, grid: ZoomGrid) -> Vec<PointGroup> {
    #[cfg(feature = "profiling")]
    profiling::scope!("generalize");

    let start = points.partition_point(|&c| c < range.min());
    let end = points.partition_point(|&c| c <= range.max());
    let points = &points[start..end];

    let mut groups = Vec::new();
    let mut i = 0;
    while i < points.len() {
        let first = points[i];
        if !range.contains(first) {
            i = skip_outside(points, i, range);
            continue;
        }

        let cell_end = grid.cell_end(first);
        let mut centroid = Centroid::default();
        while i < points.len() && points[i] <= cell_end {
            if range.contains(points[i]) {
                centroid.add(morton::decode(points[i]));
                i += 1;
            } else {
                i = skip_outside(points, i, range);
            }
        }
        groups.extend(centroid.finish());
    }
    groups
}

/// Index of the first point at or after the next code that may be inside `range`
///
/// `points[i]` must lie outside `range` and at or below its max code.
#[inline]
fn skip_outside(points: &[ZCode], i: usize, range: &CodeRange) -> usize {
    let next = range.next_inside(points[i]);
    i + points[i..].partition_point(|&c| c < next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_codes(points: &[Point]) -> Vec<ZCode> {
        let mut codes: Vec<ZCode> = points.iter().map(|&p| morton::code(p)).collect();
        codes.sort_unstable();
        codes
    }

    /// Reference implementation: filter then group consecutive codes by cell
    fn generalize_naive(points: &[ZCode], range: &CodeRange, grid: ZoomGrid) -> Vec<PointGroup> {
        let mut groups: Vec<(u64, Vec<Point>)> = Vec::new();
        for &code in points.iter().filter(|&&c| range.contains(c)) {
            let cell = code & grid.cell_mask();
            match groups.last_mut() {
                Some((last, members)) if *last == cell => members.push(morton::decode(code)),
                _ => groups.push((cell, vec![morton::decode(code)])),
            }
        }
        groups
            .into_iter()
            .map(|(_, members)| {
                let mut centroid = Centroid::default();
                members.into_iter().for_each(|p| centroid.add(p));
                centroid.finish().unwrap()
            })
            .collect()
    }

    fn random_points(len: usize, seed: u64, spread: u32) -> Vec<Point> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                Point::new(
                    (1 << 30) + (state as u32 % spread),
                    (1 << 30) + ((state >> 32) as u32 % spread),
                )
            })
            .collect()
    }

    #[test]
    fn test_zoom_grid_levels() {
        let coarsest = ZoomGrid::new(0);
        assert_eq!(coarsest.cell_size(), 1 << 29);
        assert_eq!(ZoomGrid::new(1).cell_size(), 1 << 28);
        let finest = ZoomGrid::new(200);
        assert_eq!(finest.zoom(), MAX_ZOOM);
        assert_eq!(finest.cell_size(), 1);
        assert_eq!(finest.cell_mask(), u64::MAX);
        assert!((coarsest.cell_size_normalized() - 0.125).abs() < f64::EPSILON);
    }

    #[test]
    fn test_two_points_same_cell_coarsest_zoom() {
        let points = sorted_codes(&[Point::new(10, 20), Point::new(30, 40)]);
        let groups = generalize(&points, &CodeRange::world(), ZoomGrid::new(0));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(morton::decode(groups[0].representative), Point::new(20, 30));
    }

    #[test]
    fn test_points_in_different_cells() {
        let points = sorted_codes(&[Point::new(0, 0), Point::new(u32::MAX, u32::MAX)]);
        let groups = generalize(&points, &CodeRange::world(), ZoomGrid::new(0));
        assert_eq!(groups.len(), 2);
        assert!(groups[0].representative < groups[1].representative);
        assert!(groups.iter().all(|g| g.count == 1));
    }

    #[test]
    fn test_duplicates_are_counted() {
        let p = Point::new(1 << 31, 1 << 31);
        let points = sorted_codes(&[p, p, p]);
        let groups = generalize(&points, &CodeRange::world(), ZoomGrid::new(5));
        assert_eq!(groups, vec![PointGroup { representative: morton::code(p), count: 3 }]);
    }

    #[test]
    fn test_points_outside_viewport_are_ignored() {
        let inside = Point::new(100, 100);
        // Same coarse cell as `inside`, but outside the viewport on x
        let outside = Point::new(300, 50);
        let points = sorted_codes(&[inside, outside]);
        let range = CodeRange::new(Point::new(50, 50), Point::new(200, 200));
        let groups = generalize(&points, &range, ZoomGrid::new(0));
        assert_eq!(groups, vec![PointGroup { representative: morton::code(inside), count: 1 }]);
    }

    #[test]
    fn test_centroid_count_saturates() {
        let centroid = Centroid {
            x_sum: u128::from(u32::MAX) * (1 << 33),
            y_sum: 0,
            count: 1 << 33,
        };
        let group = centroid.finish().unwrap();
        assert_eq!(group.count, u32::MAX);
        assert_eq!(morton::decode(group.representative), Point::new(u32::MAX, 0));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(generalize(&[], &CodeRange::world(), ZoomGrid::new(3)).is_empty());
        let points = sorted_codes(&[Point::new(5, 5)]);
        let range = CodeRange::new(Point::new(10, 10), Point::new(20, 20));
        assert!(generalize(&points, &range, ZoomGrid::new(3)).is_empty());
    }

    #[test]
    fn test_matches_naive_scan() {
        let points = sorted_codes(&random_points(5000, 0x1234_5678_9abc_def1, 1 << 24));
        let range = CodeRange::new(
            Point::new((1 << 30) + (1 << 21), (1 << 30) + 12_345),
            Point::new((1 << 30) + (3 << 22), (1 << 30) + (1 << 23)),
        );
        for zoom in [0, 4, 8, 10, 12, 16] {
            let grid = ZoomGrid::new(zoom);
            assert_eq!(
                generalize(&points, &range, grid),
                generalize_naive(&points, &range, grid),
                "zoom {zoom}"
            );
        }
    }

    #[test]
    fn test_counts_add_up_to_visible_points() {
        let points = sorted_codes(&random_points(2000, 77, 1 << 20));
        let range = CodeRange::new(
            Point::new((1 << 30) + 1000, (1 << 30) + 5000),
            Point::new((1 << 30) + 700_000, (1 << 30) + 900_000),
        );
        let visible = points.iter().filter(|&&c| range.contains(c)).count();
        let groups = generalize(&points, &range, ZoomGrid::new(14));
        let total: u32 = groups.iter().map(|g| g.count).sum();
        assert_eq!(total as usize, visible);
        assert!(groups.windows(2).all(|w| w[0].representative < w[1].representative));
        assert!(groups.iter().all(|g| range.contains(g.representative)));
    }
}
