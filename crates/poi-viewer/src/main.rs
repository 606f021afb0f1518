mod logging;
mod pack;
mod settings;
mod viewer;

use poi_store::{
    CacheFile, HttpTransport, NetworkThread, PoiStore, StoreConfig, StoreError, WorkerPool,
};
use settings::{Command, Settings};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, ViewerError>;

fn main() -> ExitCode {
    logging::setup_logging();
    let settings = Settings::from_cli();

    let result = match &settings.command {
        Some(Command::Pack { input, output }) => pack::run(input, output).map(|_| ()),
        None => view(&settings),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "poi-viewer failed");
            ExitCode::FAILURE
        }
    }
}

fn view(settings: &Settings) -> Result<()> {
    let cache = match &settings.cache_dir {
        Some(dir) => CacheFile::in_dir(dir),
        None => CacheFile::default_location()?,
    };
    tracing::info!(cache = %cache.path().display(), url = %settings.url, "Starting");
    let config = StoreConfig::new(settings.url.clone(), cache);
    let workers = WorkerPool::new(settings.workers)?;

    let mut network = if settings.offline {
        None
    } else {
        let transport = HttpTransport::new(Duration::from_secs(settings.timeout)).map_err(StoreError::from)?;
        Some(NetworkThread::spawn(transport)?)
    };
    let (store, events) = PoiStore::new(config, network.as_ref().map(NetworkThread::handle), workers);

    let view = viewer::View {
        viewport: settings.bbox.to_viewport(),
        zoom: settings.zoom,
        json: settings.json,
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(viewer::run(store, events, view));

    if let Some(network) = network.as_mut() {
        network.shutdown();
    }
    result
}
