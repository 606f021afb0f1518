//! Network access confined to one dedicated thread
//!
//! [`NetworkThread`] owns a current-thread tokio runtime and a [`Transport`].
//! Requests reach it over an unbounded channel through cloneable
//! [`NetworkHandle`]s; every request answers through its own oneshot channel,
//! wrapped by [`PendingFetch`]. Dropping a `PendingFetch` closes that channel,
//! which the network thread notices and uses to abort the transfer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Failure category of a network request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    ConnectionRefused,
    RemoteClosed,
    HostNotFound,
    Timeout,
    Tls,
    Http(u16),
    /// The request was aborted before completion
    Cancelled,
    /// The network thread is no longer running
    Shutdown,
    Other,
}

impl NetworkErrorKind {
    /// Equivalent I/O error kind, where one exists
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        use std::io::ErrorKind;
        match self {
            Self::ConnectionRefused => Some(ErrorKind::ConnectionRefused),
            Self::RemoteClosed => Some(ErrorKind::ConnectionReset),
            Self::Timeout => Some(ErrorKind::TimedOut),
            _ => None,
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => f.write_str("connection refused"),
            Self::RemoteClosed => f.write_str("remote host closed the connection"),
            Self::HostNotFound => f.write_str("host not found"),
            Self::Timeout => f.write_str("timed out"),
            Self::Tls => f.write_str("TLS failure"),
            Self::Http(status) => write!(f, "HTTP status {status}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Shutdown => f.write_str("network thread stopped"),
            Self::Other => f.write_str("network failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct NetworkError {
    pub kind: NetworkErrorKind,
    pub message: String,
}

impl NetworkError {
    pub fn new(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn shutdown() -> Self {
        Self::new(NetworkErrorKind::Shutdown, "request was not served")
    }
}

/// Source of remote payloads
///
/// Implementations run on the network thread's runtime. Dropping the returned
/// future must abort the request.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, NetworkError>> + Send;
}

/// HTTP(S) transport backed by reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::new(NetworkErrorKind::Other, format!("http client init failed: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>, NetworkError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(classify)?;
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}

/// Map a reqwest failure onto a [`NetworkErrorKind`]
fn classify(err: reqwest::Error) -> NetworkError {
    let kind = if err.is_timeout() {
        NetworkErrorKind::Timeout
    } else if let Some(status) = err.status() {
        NetworkErrorKind::Http(status.as_u16())
    } else {
        classify_source(&err).unwrap_or(if err.is_body() || err.is_decode() {
            NetworkErrorKind::RemoteClosed
        } else {
            NetworkErrorKind::Other
        })
    };
    NetworkError::new(kind, err.to_string())
}

/// Walk the error chain looking for a recognizable cause
fn classify_source(err: &(dyn std::error::Error + 'static)) -> Option<NetworkErrorKind> {
    use std::io::ErrorKind;
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            match io.kind() {
                ErrorKind::ConnectionRefused => return Some(NetworkErrorKind::ConnectionRefused),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::UnexpectedEof => {
                    return Some(NetworkErrorKind::RemoteClosed);
                }
                ErrorKind::TimedOut => return Some(NetworkErrorKind::Timeout),
                _ => {}
            }
        }
        let message = e.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return Some(NetworkErrorKind::HostNotFound);
        }
        if message.contains("certificate") || message.contains("tls") {
            return Some(NetworkErrorKind::Tls);
        }
        source = e.source();
    }
    None
}

type Reply = oneshot::Sender<Result<Vec<u8>, NetworkError>>;

struct FetchRequest {
    url: String,
    reply: Reply,
}

/// Cloneable entry point for submitting requests to a [`NetworkThread`]
#[derive(Clone)]
pub struct NetworkHandle {
    requests: mpsc::UnboundedSender<FetchRequest>,
}

impl NetworkHandle {
    /// Start downloading `url`
    ///
    /// The request is submitted immediately; awaiting the returned future only
    /// collects the result.
    pub fn fetch(&self, url: &str) -> PendingFetch {
        let (reply, result) = oneshot::channel();
        let request = FetchRequest {
            url: url.to_string(),
            reply,
        };
        if self.requests.send(request).is_err() {
            // The request and its reply sender are dropped here
            debug!(url, "Network thread is gone, fetch will fail");
        }
        PendingFetch { result }
    }
}

/// Result of a submitted fetch
///
/// Dropping it before completion cancels the transfer.
#[must_use = "dropping a PendingFetch cancels the request"]
pub struct PendingFetch {
    result: oneshot::Receiver<Result<Vec<u8>, NetworkError>>,
}

impl Future for PendingFetch {
    type Output = Result<Vec<u8>, NetworkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(NetworkError::shutdown())))
    }
}

/// Dedicated thread serving all network requests
pub struct NetworkThread {
    handle: NetworkHandle,
    stop: watch::Sender<bool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl NetworkThread {
    pub fn spawn<T: Transport>(transport: T) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (requests, receiver) = mpsc::unbounded_channel();
        let (stop, stopped) = watch::channel(false);

        let thread = std::thread::Builder::new()
            .name("poi-network".to_string())
            .spawn(move || {
                #[cfg(feature = "profiling")]
                profiling::register_thread!("poi-network");
                runtime.block_on(serve(Arc::new(transport), receiver, stopped));
            })?;
        info!("Network thread started");

        Ok(Self {
            handle: NetworkHandle { requests },
            stop,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> NetworkHandle {
        self.handle.clone()
    }

    /// Stop the thread, cancelling in-flight requests
    ///
    /// Requests submitted afterwards fail with [`NetworkErrorKind::Shutdown`].
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.send_replace(true);
        if thread.join().is_err() {
            warn!("Network thread panicked");
        }
        info!("Network thread stopped");
    }
}

impl Drop for NetworkThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn serve<T: Transport>(
    transport: Arc<T>,
    mut requests: mpsc::UnboundedReceiver<FetchRequest>,
    mut stopped: watch::Receiver<bool>,
) {
    // Cloned into each fetch; `stopped` stays borrowed by the select
    let stop_signal = stopped.clone();
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            _ = stopped.wait_for(|&stop| stop) => break,
            request = requests.recv() => match request {
                Some(request) => {
                    in_flight.spawn(fetch(transport.clone(), request, stop_signal.clone()));
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    // Refuse anything queued but not yet started
    requests.close();
    while let Ok(request) = requests.try_recv() {
        let _ = request.reply.send(Err(NetworkError::shutdown()));
    }
    // Running fetches observe the stop signal and reply on their own
    while in_flight.join_next().await.is_some() {}
}

async fn fetch<T: Transport>(transport: Arc<T>, request: FetchRequest, mut stopped: watch::Receiver<bool>) {
    #[cfg(feature = "profiling")]
    profiling::scope!("network::fetch");

    let FetchRequest { url, mut reply } = request;
    debug!(%url, "Fetching");
    let outcome = tokio::select! {
        result = transport.get(&url) => Some(result),
        _ = stopped.wait_for(|&stop| stop) => {
            Some(Err(NetworkError::new(NetworkErrorKind::Cancelled, "network thread shutting down")))
        }
        () = reply.closed() => None,
    };

    match outcome {
        Some(result) => {
            match &result {
                Ok(bytes) => debug!(%url, bytes = bytes.len(), "Fetch complete"),
                Err(e) => debug!(%url, error = %e, "Fetch failed"),
            }
            if reply.send(result).is_err() {
                debug!(%url, "Fetch result discarded, requester is gone");
            }
        }
        None => debug!(%url, "Fetch cancelled by requester"),
    }
}
