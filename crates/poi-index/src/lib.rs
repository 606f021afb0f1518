//! POI Index - Core Data Structures for Point-of-Interest Clustering
//!
//! This library provides compact storage, spatial indexing, and zoom-level
//! generalization of large point-of-interest sets for real-time map rendering.
//! Points live on a 32-bit fixed-point grid over the unit square of the world
//! and are kept as sorted Z-order (Morton) codes, so a viewport query is a
//! binary search plus a forward scan that skips out-of-view runs with
//! [`morton::bigmin`].
//!
//! # Architecture
//!
//! - **[`varint`]** / **[`delta`]**: LEB128 and delta coding of sorted code arrays
//! - **[`morton`]**: Z-order codes, viewport code ranges and the `bigmin` range skip
//! - **[`generalize`]**: per-zoom grid clustering into [`PointGroup`]s
//! - **[`merge`]**: reconciliation of promoted and regular groups into [`Marker`]s
//! - **[`PointSet`]**: immutable snapshot of both arrays and its cache file format
//!
//! # Performance Characteristics
//!
//! - **Decode**: O(N) over the byte stream
//! - **Query**: O(log N + K·log N) where K = number of out-of-view jumps plus cells
//! - **Memory**: 8 bytes per point in memory, typically 1-3 bytes per point on disk

pub mod delta;
pub mod generalize;
pub mod merge;
pub mod morton;
mod point_set;
pub mod utils;
pub mod varint;

// Public API exports
pub use generalize::{PointGroup, ZoomGrid};
pub use merge::Marker;
pub use morton::{CodeRange, Point, ZCode};
pub use point_set::PointSet;

/// Error types for the index crate
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid viewport: {0}")]
    InvalidViewport(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _: fn(Vec<ZCode>, Vec<ZCode>) -> PointSet = PointSet::from_codes;
        let _: fn(u8) -> ZoomGrid = ZoomGrid::new;
        let _: fn(Point) -> ZCode = morton::code;
    }

    #[test]
    fn test_error_display() {
        let err = DataError::InvalidViewport("NaN corner".to_string());
        assert_eq!(err.to_string(), "Invalid viewport: NaN corner");
    }
}
