//! Reconciliation of promoted and regular clusters into on-screen markers
//!
//! The two point arrays are generalized independently, so a promoted cluster
//! and a regular one may land on top of each other. Markers closer than the
//! proximity threshold on both axes are merged. Clusters are the connected
//! components of that "overlaps" relation over the input markers, which makes
//! the result independent of input order. Candidate pairs come from a grid of
//! threshold-sized buckets; only neighbouring buckets are compared.

use crate::generalize::{PointGroup, ZoomGrid};
use crate::morton::{self, Point};
use geo::Coord;
use std::cmp::Ordering;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A marker ready for display
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Marker {
    /// Position in normalized world coordinates
    pub position: Coord<f64>,
    /// Number of points represented, at least 1
    pub count: u32,
    /// Whether any represented point is promoted
    pub promoted: bool,
}

impl Marker {
    pub fn from_group(group: &PointGroup, promoted: bool) -> Self {
        Self {
            position: morton::decode(group.representative).to_normalized(),
            count: group.count,
            promoted,
        }
    }

    /// Combine two markers: count-weighted position, summed count, OR-ed flag
    pub fn merged(self, other: Marker) -> Marker {
        let (lw, rw) = (f64::from(self.count), f64::from(other.count));
        let total = lw + rw;
        Marker {
            position: Coord {
                x: (self.position.x * lw + other.position.x * rw) / total,
                y: (self.position.y * lw + other.position.y * rw) / total,
            },
            count: self.count.saturating_add(other.count),
            promoted: self.promoted || other.promoted,
        }
    }

    /// Whether both axis distances are below `min_distance`
    #[inline]
    pub fn overlaps(&self, other: &Marker, min_distance: f64) -> bool {
        (self.position.x - other.position.x).abs() < min_distance
            && (self.position.y - other.position.y).abs() < min_distance
    }

    fn sort_key(&self) -> u64 {
        morton::code(Point::from_normalized(self.position))
    }
}

/// Merge the clusters of both point arrays generalized on `grid`
///
/// The proximity threshold is one cell edge of `grid`.
pub fn merge(promoted: &[PointGroup], regular: &[PointGroup], grid: ZoomGrid) -> Vec<Marker> {
    #[cfg(feature = "profiling")]
    profiling::scope!("merge");

    let markers = promoted
        .iter()
        .map(|g| Marker::from_group(g, true))
        .chain(regular.iter().map(|g| Marker::from_group(g, false)))
        .collect();
    merge_markers(markers, grid.cell_size_normalized())
}

/// Merge every connected group of overlapping markers
///
/// Output is ordered by the Z-order code of the marker positions.
pub fn merge_markers(markers: Vec<Marker>, min_distance: f64) -> Vec<Marker> {
    let mut merged = if min_distance > 0.0 {
        let mut components = DisjointSets::new(markers.len());
        for (i, j) in overlapping_pairs(&markers, min_distance) {
            components.union(i, j);
        }

        let mut clusters: Vec<Option<Marker>> = vec![None; markers.len()];
        for (i, marker) in markers.into_iter().enumerate() {
            let slot = &mut clusters[components.find(i)];
            *slot = Some(match slot.take() {
                Some(acc) => acc.merged(marker),
                None => marker,
            });
        }
        clusters.into_iter().flatten().collect()
    } else {
        markers
    };

    merged.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| a.position.x.total_cmp(&b.position.x))
            .then_with(|| a.position.y.total_cmp(&b.position.y))
            .then_with(|| a.count.cmp(&b.count))
            .then_with(|| a.promoted.cmp(&b.promoted))
    });
    merged
}

/// Index pairs `(i, j)` with `i < j` of overlapping markers
fn overlapping_pairs(markers: &[Marker], min_distance: f64) -> Vec<(usize, usize)> {
    let bucket_of = |m: &Marker| {
        (
            (m.position.x / min_distance).floor() as i64,
            (m.position.y / min_distance).floor() as i64,
        )
    };

    let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, marker) in markers.iter().enumerate() {
        buckets.entry(bucket_of(marker)).or_default().push(i);
    }

    let mut pairs = Vec::new();
    for (i, marker) in markers.iter().enumerate() {
        let (bx, by) = bucket_of(marker);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(neighbours) = buckets.get(&(bx + dx, by + dy)) else {
                    continue;
                };
                pairs.extend(
                    neighbours
                        .iter()
                        .filter(|&&j| j > i && marker.overlaps(&markers[j], min_distance))
                        .map(|&j| (i, j)),
                );
            }
        }
    }
    pairs
}

/// Union-find over marker indices
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        match ra.cmp(&rb) {
            Ordering::Less => self.parent[rb] = ra,
            Ordering::Greater => self.parent[ra] = rb,
            Ordering::Equal => {}
        }
    }
}
