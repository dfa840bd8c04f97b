//! Viewer bridge: shows a document on a fresh surface.
//!
//! Each show runs `Loading -> Rendering -> Idle`, or ends in `Error` before
//! any surface is opened. Every call owns its own [`ShowSession`] and state
//! channel; calls share nothing but the server slot, so a new call never
//! depends on an earlier one.

use std::fmt::{self, Debug, Formatter};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docview_server::mime::HTML_UTF8;
use docview_server::{DEFAULT_CSP, RunningServer, ServerError, ServerOptions, ServerSlot};
use docview_types::{CorrelationId, ViewerMessage};
use thiserror::Error;
use tokio::fs;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task;
use url::Url;

use crate::bundle::{BundleError, default_bundle_dir, stage_bundle_html};
use crate::rewrite::{
    decode_document, policy_admitting, replace_csp, rewrite, sandbox_uri_mapper,
    server_uri_mapper,
};
use crate::surface::{SurfaceError, SurfaceOptions, ViewerHost, ViewerSurface};

const RESOURCE_EVENTS_CAPACITY: usize = 64;

/// How assets reach the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Serve through the embedded localhost server. The first document shown
    /// decides the server root; later documents elsewhere use `fsPath`.
    Server { port: u16 },
    /// Stage a static bundle and address it with sandbox URIs.
    /// `None` stages into `<document dir>/_docview`.
    Bundle { dir: Option<PathBuf> },
}

impl Default for DeploymentMode {
    fn default() -> Self {
        Self::Server { port: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewerState {
    #[default]
    Idle,
    Loading,
    Rendering,
    Error,
}

#[derive(Debug, Error)]
pub enum ShowError {
    #[error("cannot read document {path}: {source}")]
    DocumentUnreadable {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    #[error("documentation server failed to start: {0}")]
    ServerStart(#[from] ServerError),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("failed to stage bundle: {0}")]
    Bundle(#[from] BundleError),
}

/// A resource the page asked the host to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOpened {
    pub url: Url,
    /// The `show` call whose surface sent the request.
    pub session: CorrelationId,
}

/// Result of a successful `show`.
pub struct ShowOutcome {
    pub id: CorrelationId,
    /// URL announced to the surface in the resource-ready message.
    pub url: String,
    pub surface: Arc<dyn ViewerSurface>,
}

impl Debug for ShowOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShowOutcome")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("surface_closed", &self.surface.is_closed())
            .finish()
    }
}

pub struct ViewerBridge {
    host: Arc<dyn ViewerHost>,
    slot: Arc<ServerSlot>,
    mode: DeploymentMode,
    opened: broadcast::Sender<ResourceOpened>,
}

/// One `show` call: its correlation id and its own state machine.
///
/// Take [`ShowSession::watch_state`] before calling [`ShowSession::show`] to
/// follow the transitions; the receiver keeps the final state afterwards.
pub struct ShowSession<'a> {
    bridge: &'a ViewerBridge,
    id: CorrelationId,
    state: watch::Sender<ViewerState>,
}

/// Rewritten root document held in the server registry for one session.
struct Registration {
    server: Arc<RunningServer>,
    path: PathBuf,
    generation: u64,
}

impl Registration {
    async fn release(self, session: CorrelationId) {
        if self.server.release_content(&self.path, self.generation).await {
            tracing::debug!(%session, document = %self.path.display(), "Released rewritten document");
        }
    }
}

/// Document prepared during `Loading`, waiting for a surface.
struct Prepared {
    html: String,
    resource_roots: Vec<PathBuf>,
    address: Address,
    registration: Option<Registration>,
}

enum Address {
    /// Already rewritten for the server; announce this URL.
    Served(String),
    /// Staged bundle, rewritten against the surface's own URIs once it exists.
    Staged { dir: PathBuf, index: PathBuf },
}

impl ViewerBridge {
    #[must_use]
    pub fn new(host: Arc<dyn ViewerHost>, slot: Arc<ServerSlot>, mode: DeploymentMode) -> Self {
        let (opened, _) = broadcast::channel(RESOURCE_EVENTS_CAPACITY);
        Self {
            host,
            slot,
            mode,
            opened,
        }
    }

    /// Resources the viewer asks to open, from every surface this bridge shows.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceOpened> {
        self.opened.subscribe()
    }

    #[must_use]
    pub fn mode(&self) -> &DeploymentMode {
        &self.mode
    }

    /// A fresh session with a new correlation id, in `Idle`.
    #[must_use]
    pub fn session(&self) -> ShowSession<'_> {
        let (state, _) = watch::channel(ViewerState::Idle);
        ShowSession {
            bridge: self,
            id: CorrelationId::next(),
            state,
        }
    }

    /// Show `path` on a new surface titled `title`.
    pub async fn show(&self, path: &Path, title: &str) -> Result<ShowOutcome, ShowError> {
        self.session().show(path, title).await
    }

    async fn load(&self, path: &Path) -> Result<Prepared, ShowError> {
        let unreadable = |source| ShowError::DocumentUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let bytes = fs::read(path).await.map_err(unreadable)?;
        let document = fs::canonicalize(path).await.map_err(unreadable)?;
        let doc_dir = document
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        let html = decode_document(bytes, &document);

        match &self.mode {
            DeploymentMode::Server { port } => {
                let options = ServerOptions::new(&doc_dir).with_port(*port);
                let server = self.slot.get_or_start(&options).await?;
                let info = server.connection_info();
                let map = server_uri_mapper(info, server.root());
                let policy = policy_admitting(DEFAULT_CSP, &info.base_url());
                let rendered = replace_csp(&rewrite(&html, &doc_dir, &map), &policy);

                let generation = server
                    .register_content(&document, rendered.clone().into_bytes(), HTML_UTF8)
                    .await;
                Ok(Prepared {
                    html: rendered,
                    resource_roots: vec![doc_dir],
                    address: Address::Served(map(&document)),
                    registration: Some(Registration {
                        server,
                        path: document,
                        generation,
                    }),
                })
            }
            DeploymentMode::Bundle { dir } => {
                let bundle_dir = dir
                    .clone()
                    .or_else(|| default_bundle_dir(&document))
                    .unwrap_or_else(|| doc_dir.clone());
                let manifest = {
                    let staged_doc = document.clone();
                    task::spawn_blocking(move || stage_bundle_html(&staged_doc, &html, &bundle_dir))
                        .await
                        .map_err(|e| BundleError::Write {
                            path: document.clone(),
                            source: IoError::other(e),
                        })??
                };
                let staged = fs::read(&manifest.index).await.map_err(unreadable)?;
                Ok(Prepared {
                    html: decode_document(staged, &manifest.index),
                    resource_roots: vec![manifest.dir.clone(), doc_dir],
                    address: Address::Staged {
                        dir: manifest.dir,
                        index: manifest.index,
                    },
                    registration: None,
                })
            }
        }
    }
}

impl ShowSession<'_> {
    #[must_use]
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ViewerState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ViewerState> {
        self.state.subscribe()
    }

    /// Show `path` on a new surface titled `title`.
    pub async fn show(self, path: &Path, title: &str) -> Result<ShowOutcome, ShowError> {
        let id = self.id;
        let result = self.run(path, title).await;
        match &result {
            Ok(outcome) => {
                self.transition(ViewerState::Idle);
                tracing::info!(%id, document = %path.display(), url = %outcome.url, "Document shown");
            }
            Err(e) => {
                self.transition(ViewerState::Error);
                tracing::warn!(%id, document = %path.display(), "Failed to show document: {e}");
            }
        }
        result
    }

    async fn run(&self, path: &Path, title: &str) -> Result<ShowOutcome, ShowError> {
        let id = self.id;
        self.transition(ViewerState::Loading);
        let prepared = self.bridge.load(path).await?;

        self.transition(ViewerState::Rendering);
        let surface = match self
            .bridge
            .host
            .open(SurfaceOptions::new(title, prepared.resource_roots))
        {
            Ok(surface) => surface,
            Err(e) => {
                if let Some(registration) = prepared.registration {
                    registration.release(id).await;
                }
                return Err(e.into());
            }
        };

        let (html, url) = match prepared.address {
            Address::Served(url) => (prepared.html, url),
            Address::Staged { dir, index } => {
                let html = rewrite(&prepared.html, &dir, sandbox_uri_mapper(surface.as_ref()));
                let policy = policy_admitting(DEFAULT_CSP, &surface.csp_source());
                (replace_csp(&html, &policy), surface.as_viewer_uri(&index))
            }
        };

        if let Err(e) = surface.set_html(html) {
            tracing::debug!(%id, "Surface closed before content was set: {e}");
        }
        self.spawn_inbound_forwarder(surface.as_ref(), prepared.registration);
        if let Err(e) = surface.post_message(&ViewerMessage::resource_ready(url.clone(), id)) {
            tracing::debug!(%id, "Surface closed before resource-ready was posted: {e}");
        }

        Ok(ShowOutcome { id, url, surface })
    }

    fn spawn_inbound_forwarder(
        &self,
        surface: &dyn ViewerSurface,
        registration: Option<Registration>,
    ) {
        let Some(inbound) = surface.take_inbound() else {
            tracing::debug!(session = %self.id, "Surface has no inbound channel");
            return;
        };
        tokio::spawn(forward_inbound(
            self.id,
            inbound,
            self.bridge.opened.clone(),
            registration,
        ));
    }

    fn transition(&self, state: ViewerState) {
        tracing::debug!(id = %self.id, ?state, "Viewer state");
        self.state.send_replace(state);
    }
}

/// Forward `{type:"sphinx"}` requests from the page until the surface goes
/// away, then release the session's registered document.
async fn forward_inbound(
    session: CorrelationId,
    mut inbound: mpsc::UnboundedReceiver<serde_json::Value>,
    opened: broadcast::Sender<ResourceOpened>,
    registration: Option<Registration>,
) {
    while let Some(raw) = inbound.recv().await {
        let message = match ViewerMessage::from_value(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(%session, "Ignoring viewer message: {e}");
                continue;
            }
        };
        match Url::parse(message.content()) {
            Ok(url) => {
                tracing::debug!(%session, %url, "Viewer requested resource");
                // No subscribers is fine; the notification is fire-and-forget.
                let _ = opened.send(ResourceOpened { url, session });
            }
            Err(e) => {
                tracing::debug!(%session, content = message.content(), "Unparseable resource URL: {e}");
            }
        }
    }
    tracing::debug!(%session, "Viewer surface inbound stream ended");
    if let Some(registration) = registration {
        registration.release(session).await;
    }
}
