//! Persistent cache of the last downloaded POI payload

use crate::{Result, StoreError};
use poi_index::PointSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the cache inside the cache directory
pub const CACHE_FILE_NAME: &str = "poi.bin";

/// Location of the cached payload
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the cache, so readers see either the old or the new payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cache file named [`CACHE_FILE_NAME`] inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE_NAME))
    }

    /// Cache file in the per-user cache directory of the platform
    pub fn default_location() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("io", "mapex", "poi-viewer").ok_or(StoreError::CacheDir)?;
        Ok(Self::in_dir(dirs.cache_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the cache; a missing file is an empty set
    pub fn load(&self) -> Result<PointSet> {
        #[cfg(feature = "profiling")]
        profiling::scope!("CacheFile::load");

        let set = PointSet::read_from(&self.path)?;
        tracing::debug!(path = %self.path.display(), points = set.len(), "Loaded cache");
        Ok(set)
    }

    /// Atomically replace the cache contents with `bytes`
    pub fn store(&self, bytes: &[u8]) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("CacheFile::store");

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "Stored cache");
        Ok(())
    }
}
