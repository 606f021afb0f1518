//! POI Store - Asynchronous Snapshot Orchestration
//!
//! Keeps an immutable [`PointSet`](poi_index::PointSet) snapshot available
//! without ever blocking the caller. A reload races a network download, which
//! writes through to a persistent cache file, against a direct read of that
//! cache, and publishes whichever usable result arrives first.
//!
//! # Architecture
//!
//! - **[`NetworkThread`]**: one dedicated thread owning all network I/O
//! - **[`WorkerPool`]**: rayon pool for decoding, cache writes and clustering
//! - **[`CacheFile`]**: the on-disk snapshot, replaced atomically
//! - **[`PoiStore`]**: the race, the snapshot swap and viewport queries
//!
//! Consumers learn about new snapshots through [`PoiEvent`]s delivered on an
//! unbounded channel, so no worker ever calls back into consumer code.

pub mod cache;
pub mod executor;
pub mod network;
mod store;

pub use cache::CacheFile;
pub use executor::WorkerPool;
pub use network::{
    HttpTransport, NetworkError, NetworkErrorKind, NetworkHandle, NetworkThread, PendingFetch,
    Transport,
};
pub use store::{DEFAULT_URL, PoiEvent, PoiStore, StoreConfig};

use poi_index::DataError;

/// Error types for the store crate
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("No cache directory could be determined for this platform")]
    CacheDir,

    #[error("Cache IO error: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("Worker pool error: {0}")]
    Worker(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Reload superseded by a newer one")]
    Superseded,

    #[error("Data error: {0}")]
    Data(DataError),
}

impl From<DataError> for StoreError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Io(e) => StoreError::CacheIo(e),
            other => StoreError::Data(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
