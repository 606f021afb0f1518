//! Immutable snapshot of the promoted and regular point arrays

use crate::generalize::{self, ZoomGrid};
use crate::merge::{self, Marker};
use crate::morton::{self, CodeRange, Point, ZCode};
use crate::{Result, delta, varint};
use geo::Rect;
use std::io::ErrorKind;
use std::path::Path;

/// Two ascending arrays of Morton codes, duplicates permitted
///
/// The cache file layout is `[varint promoted count][delta(promoted)][delta(regular)]`;
/// the regular count is implied by the end of the stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointSet {
    promoted: Vec<ZCode>,
    regular: Vec<ZCode>,
}

impl PointSet {
    /// Build a set from codes in any order
    pub fn from_codes(mut promoted: Vec<ZCode>, mut regular: Vec<ZCode>) -> Self {
        promoted.sort_unstable();
        regular.sort_unstable();
        Self { promoted, regular }
    }

    pub fn from_points<P, R>(promoted: P, regular: R) -> Self
    where
        P: IntoIterator<Item = Point>,
        R: IntoIterator<Item = Point>,
    {
        Self::from_codes(
            promoted.into_iter().map(morton::code).collect(),
            regular.into_iter().map(morton::code).collect(),
        )
    }

    /// Parse the cache file format
    ///
    /// Never fails: malformed input yields whatever complete values it holds.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("PointSet::from_bytes");

        let mut header = Vec::with_capacity(1);
        let offset = varint::decode_n(bytes, 1, &mut header);
        let Some(&promoted_count) = header.first() else {
            return Self::default();
        };

        let mut promoted = Vec::new();
        let consumed = delta::decode_n(&bytes[offset..], promoted_count as usize, &mut promoted);
        let regular = delta::decode(&bytes[offset + consumed..]);

        tracing::debug!(
            promoted = promoted.len(),
            regular = regular.len(),
            bytes = bytes.len(),
            "Decoded point set"
        );

        // A corrupted stream may decode out of order; queries need sorted arrays
        if promoted.is_sorted() && regular.is_sorted() {
            Self { promoted, regular }
        } else {
            tracing::warn!("Point set stream is not sorted, sorting after decode");
            Self::from_codes(promoted, regular)
        }
    }

    /// Serialize into the cache file format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * 2 + varint::encoded_len(self.promoted.len() as u64));
        varint::encode([self.promoted.len() as u64], &mut out);
        delta::encode(&self.promoted, &mut out);
        delta::encode(&self.regular, &mut out);
        out
    }

    /// Read a cache file; a missing file is an empty set
    pub fn read_from(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Self::from_bytes(&bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No cache file, using an empty point set");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn promoted(&self) -> &[ZCode] {
        &self.promoted
    }

    #[inline]
    pub fn regular(&self) -> &[ZCode] {
        &self.regular
    }

    /// Total number of points in both arrays
    #[inline]
    pub fn len(&self) -> usize {
        self.promoted.len() + self.regular.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.regular.is_empty()
    }

    /// Cluster the points visible in `viewport` at `zoom` into markers
    ///
    /// Both arrays are generalized in parallel on the rayon pool, then merged.
    pub fn generalize(&self, viewport: &Rect<f64>, zoom: u8) -> Result<Vec<Marker>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("PointSet::generalize");

        let range = CodeRange::from_viewport(viewport)?;
        let grid = ZoomGrid::new(zoom);
        let (promoted, regular) = rayon::join(
            || generalize::generalize(&self.promoted, &range, grid),
            || generalize::generalize(&self.regular, &range, grid),
        );
        Ok(merge::merge(&promoted, &regular, grid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataError;
    use geo::Coord;

    fn sample() -> PointSet {
        PointSet::from_points(
            [Point::new(1 << 31, 1 << 31), Point::new(10, 10)],
            [
                Point::new(5, 7),
                Point::new(5, 7),
                Point::new(u32::MAX, 0),
                Point::new(123_456, 654_321),
            ],
        )
    }

    fn world() -> Rect<f64> {
        Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 })
    }

    #[test]
    fn test_from_codes_sorts() {
        let set = PointSet::from_codes(vec![9, 1, 5], vec![3, 3, 2]);
        assert_eq!(set.promoted(), &[1, 5, 9]);
        assert_eq!(set.regular(), &[2, 3, 3]);
        assert_eq!(set.len(), 6);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let set = sample();
        assert_eq!(PointSet::from_bytes(&set.to_bytes()), set);
    }

    #[test]
    fn test_byte_layout() {
        let set = PointSet::from_codes(vec![3, 3], vec![10, 25]);
        assert_eq!(set.to_bytes(), vec![2, 3, 0, 10, 15]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(PointSet::from_bytes(&[]).is_empty());
        let empty = PointSet::default();
        assert_eq!(empty.to_bytes(), vec![0]);
        assert!(PointSet::from_bytes(&empty.to_bytes()).is_empty());
    }

    #[test]
    fn test_promoted_count_larger_than_stream() {
        // Header claims 5 promoted points, only 2 follow
        let set = PointSet::from_bytes(&[5, 1, 1]);
        assert_eq!(set.promoted(), &[1, 2]);
        assert!(set.regular().is_empty());
    }

    #[test]
    fn test_unsorted_stream_is_sorted_on_load() {
        let mut bytes = Vec::new();
        varint::encode([0], &mut bytes);
        delta::encode(&[10, 3, 7], &mut bytes);
        let set = PointSet::from_bytes(&bytes);
        assert_eq!(set.regular(), &[3, 7, 10]);
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = PointSet::read_from(&dir.path().join("does-not-exist.bin")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_read_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poi.bin");
        let set = sample();
        std::fs::write(&path, set.to_bytes()).unwrap();
        assert_eq!(PointSet::read_from(&path).unwrap(), set);
    }

    #[test]
    fn test_generalize_world_counts_everything() {
        let set = sample();
        let markers = set.generalize(&world(), 0).unwrap();
        let total: u32 = markers.iter().map(|m| m.count).sum();
        assert_eq!(total as usize, set.len());
        assert!(markers.iter().any(|m| m.promoted));
    }

    #[test]
    fn test_generalize_marks_promoted_clusters() {
        // Promoted point at (10, 10) shares the coarsest cell with regular points near the origin
        let set = sample();
        let markers = set.generalize(&world(), 0).unwrap();
        let origin = markers
            .iter()
            .find(|m| m.position.x < 0.01 && m.position.y < 0.01)
            .unwrap();
        assert!(origin.promoted);
        assert_eq!(origin.count, 4);
    }

    #[test]
    fn test_generalize_empty_set() {
        assert!(PointSet::default().generalize(&world(), 12).unwrap().is_empty());
    }

    #[test]
    fn test_generalize_rejects_nan_viewport() {
        let viewport = Rect::new(Coord { x: f64::NAN, y: 0.0 }, Coord { x: 1.0, y: 1.0 });
        assert!(matches!(
            PointSet::default().generalize(&viewport, 3),
            Err(DataError::InvalidViewport(_))
        ));
    }
}
