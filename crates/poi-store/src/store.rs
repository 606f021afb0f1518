//! Snapshot orchestration: reload race, publication and viewport queries

use crate::cache::CacheFile;
use crate::executor::{self, WorkerPool};
use crate::network::NetworkHandle;
use crate::{Result, StoreError};
use geo::Rect;
use poi_index::{Marker, PointSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where the POI payload is published
pub const DEFAULT_URL: &str = "https://raw.githubusercontent.com/VestniK/mapex/master/poi.bin";

/// Notifications sent to the store's consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoiEvent {
    /// A new snapshot was published
    Updated,
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Payload location
    pub url: String,
    /// Persistent copy of the last payload
    pub cache: CacheFile,
}

impl StoreConfig {
    pub fn new(url: impl Into<String>, cache: CacheFile) -> Self {
        Self {
            url: url.into(),
            cache,
        }
    }

    /// Default URL with the cache in the platform cache directory
    pub fn with_default_cache() -> Result<Self> {
        Ok(Self::new(DEFAULT_URL, CacheFile::default_location()?))
    }
}

/// Owner of the current [`PointSet`] snapshot
///
/// Cloning is cheap and every clone shares the same snapshot.
#[derive(Clone)]
pub struct PoiStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    /// `None` keeps the store offline, reading the cache only
    network: Option<NetworkHandle>,
    workers: WorkerPool,
    snapshot: RwLock<Arc<PointSet>>,
    /// Number of the most recently started reload
    generation: AtomicU64,
    events: mpsc::UnboundedSender<PoiEvent>,
}

impl PoiStore {
    /// Create a store with an empty snapshot
    ///
    /// Returns the receiving end of the store's events alongside it.
    pub fn new(
        config: StoreConfig,
        network: Option<NetworkHandle>,
        workers: WorkerPool,
    ) -> (Self, mpsc::UnboundedReceiver<PoiEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            config,
            network,
            workers,
            snapshot: RwLock::new(Arc::new(PointSet::default())),
            generation: AtomicU64::new(0),
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<PointSet> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Refresh the snapshot from the network and the cache
    ///
    /// Must be called from within a tokio runtime. The returned handle resolves
    /// once this reload published its snapshot or failed; on success exactly
    /// one [`PoiEvent::Updated`] is sent. A reload that is overtaken by a newer
    /// one resolves to [`StoreError::Superseded`] without publishing.
    pub fn reload(&self) -> JoinHandle<Result<()>> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();
        executor::spawn(async move { inner.reload(generation).await })
    }

    /// Cluster the current snapshot for `viewport` at `zoom`
    pub async fn generalize(&self, viewport: Rect<f64>, zoom: u8) -> Result<Vec<Marker>> {
        let snapshot = self.snapshot();
        let markers = self
            .inner
            .workers
            .run(move || snapshot.generalize(&viewport, zoom))
            .await??;
        Ok(markers)
    }
}

impl Inner {
    async fn reload(self: Arc<Self>, generation: u64) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("PoiStore::reload");

        debug!(generation, "Reload started");
        let cached = self.load_cache();
        let outcome = match &self.network {
            Some(network) => {
                // Detached, so a losing download still refreshes the cache
                let downloaded = executor::spawn(self.clone().download(network.clone()));
                race(downloaded, cached).await
            }
            None => cached.await,
        };

        match outcome {
            Ok(set) => self.publish(generation, set),
            Err(e) => {
                error!(generation, error = %e, "Reload failed, keeping the current snapshot");
                Err(e)
            }
        }
    }

    fn load_cache(&self) -> impl Future<Output = Result<PointSet>> + Send + 'static {
        let cache = self.config.cache.clone();
        let loaded = self.workers.run(move || cache.load());
        async move { loaded.await.and_then(|set| set) }
    }

    /// Fetch the payload, write it through to the cache and parse it
    ///
    /// A payload that could not be cached is not used.
    async fn download(self: Arc<Self>, network: NetworkHandle) -> Result<PointSet> {
        let bytes = network.fetch(&self.config.url).await?;
        debug!(bytes = bytes.len(), "Payload downloaded");

        let cache = self.config.cache.clone();
        self.workers
            .run(move || -> Result<PointSet> {
                cache.store(&bytes).inspect_err(|e| {
                    warn!(path = %cache.path().display(), error = %e, "Failed to update the cache");
                })?;
                Ok(PointSet::from_bytes(&bytes))
            })
            .await?
    }

    fn publish(&self, generation: u64, set: PointSet) -> Result<()> {
        let points = set.len();
        {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, "Reload superseded, discarding its result");
                return Err(StoreError::Superseded);
            }
            *snapshot = Arc::new(set);
        }

        info!(generation, points, "POI snapshot published");
        if self.events.send(PoiEvent::Updated).is_err() {
            debug!("Nobody listens for store events");
        }
        Ok(())
    }
}

/// Pick the first usable result of the download and cache racers
///
/// An empty cache does not win while the download is outstanding. A failed
/// download falls back to the cache, and a failed cache read waits for the
/// download. When both fail, the error of the one that failed last is returned.
async fn race<C>(downloaded: JoinHandle<Result<PointSet>>, cached: C) -> Result<PointSet>
where
    C: Future<Output = Result<PointSet>>,
{
    let downloaded = async move {
        match downloaded.await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Task(e)),
        }
    };
    let mut downloaded = std::pin::pin!(downloaded);
    let mut cached = std::pin::pin!(cached);

    tokio::select! {
        from_cache = &mut cached => match from_cache {
            Ok(set) if !set.is_empty() => {
                debug!(points = set.len(), "Cache won the race");
                Ok(set)
            }
            Ok(empty) => {
                debug!("Cache is empty, waiting for the download");
                downloaded.await.or_else(|e| {
                    warn!(error = %e, "Download failed, falling back to the empty cache");
                    Ok(empty)
                })
            }
            Err(e) => {
                warn!(error = %e, "Cache read failed, waiting for the download");
                downloaded.await
            }
        },
        from_network = &mut downloaded => match from_network {
            Ok(set) => {
                debug!(points = set.len(), "Download won the race");
                Ok(set)
            }
            Err(e) => {
                warn!(error = %e, "Download failed, falling back to the cache");
                cached.await
            }
        },
    }
}
