//! The embedded server: a loopback listener, one task per connection.
//!
//! Handlers share an `Arc<ServerState>` and nothing else. Resolution and
//! response building are pure functions of the request and the root, so
//! overlapping requests need no coordination.

use std::borrow::Cow;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use docview_types::{DocumentRequest, ServerConnectionInfo};
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::http::{self, HttpError, Method};
use crate::registry::ContentRegistry;
use crate::resolve::{DocRoot, ResolveError, resolve};
use crate::respond::{self, ContentResult};

/// How long a client may take to send its request head.
const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept` so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid document root: {0}")]
    Root(#[from] ResolveError),
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Startup parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub root: PathBuf,
    /// `0` picks an ephemeral port.
    pub port: u16,
}

impl ServerOptions {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            port: 0,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

#[derive(Debug)]
struct ServerState {
    root: DocRoot,
    registry: ContentRegistry,
}

/// A listening server. Dropping it stops the accept loop.
#[derive(Debug)]
pub struct RunningServer {
    info: ServerConnectionInfo,
    state: Arc<ServerState>,
    shutdown_tx: watch::Sender<bool>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RunningServer {
    pub async fn start(options: &ServerOptions) -> Result<Self, ServerError> {
        let root = DocRoot::new(&options.root)?;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, options.port))
            .await
            .map_err(|source| ServerError::Bind {
                port: options.port,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            port: options.port,
            source,
        })?;

        let info = ServerConnectionInfo::new(addr.port());
        let state = Arc::new(ServerState {
            root,
            registry: ContentRegistry::new(),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_handle = tokio::spawn(accept_loop(listener, state.clone(), shutdown_rx));

        tracing::info!(
            url = %info.base_url(),
            root = %state.root.path().display(),
            "Documentation server listening"
        );

        Ok(Self {
            info,
            state,
            shutdown_tx,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    #[must_use]
    pub fn connection_info(&self) -> &ServerConnectionInfo {
        &self.info
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.state.root.path()
    }

    /// Serve `bytes` for requests that resolve to `path`, ahead of the disk.
    /// Returns the registration generation.
    pub async fn register_content(
        &self,
        path: &Path,
        bytes: impl Into<Arc<[u8]>>,
        content_type: impl Into<Cow<'static, str>>,
    ) -> u64 {
        self.state.registry.register(path, bytes, content_type).await
    }

    pub async fn unregister_content(&self, path: &Path) -> bool {
        self.state.registry.unregister(path).await
    }

    /// Drop the registration for `path` if it is still `generation`.
    pub async fn release_content(&self, path: &Path, generation: u64) -> bool {
        self.state.registry.release(path, generation).await
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    ///
    /// In-flight connections finish their current response.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.accept_handle.lock().await.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!("Accept loop ended abnormally: {e}");
        }
        tracing::info!(url = %self.info.base_url(), "Documentation server stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let state = state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, &state).await {
                            tracing::debug!(%peer, "Connection ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {e}");
                    sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    state: &ServerState,
) -> io::Result<()> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let head = timeout(REQUEST_HEAD_TIMEOUT, http::read_request(&mut reader)).await;
    let (response, head_only) = match head {
        Err(_) => {
            tracing::debug!(%peer, "Timed out waiting for request head");
            return Ok(());
        }
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(HttpError::Io(e))) => return Err(e),
        Ok(Err(e)) => {
            tracing::debug!(%peer, "Rejecting request: {e}");
            (respond::bad_request(&e.to_string()), false)
        }
        Ok(Ok(Some(request))) => {
            let response = handle_request(&request, state).await;
            (response, request.method == Method::Head)
        }
    };

    http::write_response(&mut write_half, &response, head_only).await
}

async fn handle_request(request: &http::HttpRequest, state: &ServerState) -> ContentResult {
    if request.method == Method::Other {
        tracing::info!(
            method = %request.method_name,
            url = %request.target,
            status = 405,
            "Rejected request"
        );
        return respond::method_not_allowed();
    }

    let document = match http::parse_target(&request.target) {
        Ok(document) => document,
        Err(e) => return respond::bad_request(&e.to_string()),
    };

    let (response, resolved) = serve_document(&document, state).await;
    let resolved = resolved.as_deref().map_or(Cow::Borrowed("-"), Path::to_string_lossy);
    tracing::info!(
        method = %request.method_name,
        url = %request.target,
        path = %resolved,
        status = response.status.code(),
        "Served request"
    );
    response
}

/// Registry first, then disk. Returns the path the request resolved to.
async fn serve_document(
    document: &DocumentRequest,
    state: &ServerState,
) -> (ContentResult, Option<PathBuf>) {
    if let Ok((target, _)) = state.root.target_of(document)
        && let Some(content) = state.registry.get(&target).await
    {
        return (respond::registered(&content), Some(target));
    }

    match resolve(document, &state.root) {
        Ok(asset) => {
            let response = respond::respond(&asset).await;
            (response, Some(asset.absolute_path().to_path_buf()))
        }
        Err(e) => {
            if e.is_not_found() {
                tracing::debug!("Request not served: {e}");
            } else {
                tracing::warn!("Request not served: {e}");
            }
            let requested = document
                .fs_path_override()
                .unwrap_or(document.requested_path());
            (respond::not_found(requested), None)
        }
    }
}
