//! The rendering surface the bridge draws into.
//!
//! A host editor supplies [`ViewerHost`]; each opened [`ViewerSurface`] takes
//! HTML, receives [`ViewerMessage`]s, hands back inbound JSON from the page and
//! mints URIs its sandbox will load. [`RecordingHost`] is the headless
//! implementation used by the `render` command and by tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use docview_types::ViewerMessage;
use docview_utils::to_slash;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Identifier every documentation surface is opened with.
pub const SURFACE_IDENTIFIER: &str = "sphinx";

/// Scheme of the URIs minted by [`RecordingSurface`].
pub const SANDBOX_SCHEME: &str = "docview-resource";

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("viewer surface is closed")]
    Closed,
    #[error("viewer host refused to open a surface: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub title: String,
    pub identifier: String,
    /// Directories the surface may load files from.
    pub local_resource_roots: Vec<PathBuf>,
}

impl SurfaceOptions {
    #[must_use]
    pub fn new(title: impl Into<String>, local_resource_roots: Vec<PathBuf>) -> Self {
        Self {
            title: title.into(),
            identifier: SURFACE_IDENTIFIER.to_string(),
            local_resource_roots,
        }
    }
}

pub trait ViewerSurface: Send + Sync {
    fn set_html(&self, html: String) -> Result<(), SurfaceError>;

    fn post_message(&self, message: &ViewerMessage) -> Result<(), SurfaceError>;

    /// Inbound messages from the page. Yields `Some` once per surface.
    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<serde_json::Value>>;

    /// A URI the sandbox will load `path` from.
    fn as_viewer_uri(&self, path: &Path) -> String;

    /// CSP source expression admitting every URI from [`Self::as_viewer_uri`].
    fn csp_source(&self) -> String;

    fn is_closed(&self) -> bool;
}

pub trait ViewerHost: Send + Sync {
    fn open(&self, options: SurfaceOptions) -> Result<Arc<dyn ViewerSurface>, SurfaceError>;
}

/// Headless host that keeps every surface it opens.
#[derive(Debug, Default)]
pub struct RecordingHost {
    surfaces: Mutex<Vec<Arc<RecordingSurface>>>,
}

impl RecordingHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn surfaces(&self) -> Vec<Arc<RecordingSurface>> {
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ViewerHost for RecordingHost {
    fn open(&self, options: SurfaceOptions) -> Result<Arc<dyn ViewerSurface>, SurfaceError> {
        tracing::debug!(title = %options.title, identifier = %options.identifier, "Opening surface");
        let surface = Arc::new(RecordingSurface::new(options));
        self.surfaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(surface.clone());
        let surface: Arc<dyn ViewerSurface> = surface;
        Ok(surface)
    }
}

#[derive(Debug)]
pub struct RecordingSurface {
    options: SurfaceOptions,
    html: Mutex<Option<String>>,
    posted: Mutex<Vec<ViewerMessage>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<serde_json::Value>>>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<serde_json::Value>>>,
    closed: AtomicBool,
}

impl RecordingSurface {
    fn new(options: SurfaceOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            options,
            html: Mutex::new(None),
            posted: Mutex::new(Vec::new()),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SurfaceOptions {
        &self.options
    }

    #[must_use]
    pub fn html(&self) -> Option<String> {
        self.html
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn posted(&self) -> Vec<ViewerMessage> {
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deliver `message` as if the page had sent it. False once closed.
    pub fn send_from_viewer(&self, message: serde_json::Value) -> bool {
        self.inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Close the surface. Later writes fail with [`SurfaceError::Closed`] and
    /// the inbound stream ends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.inbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn ensure_open(&self) -> Result<(), SurfaceError> {
        if self.is_closed() {
            Err(SurfaceError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ViewerSurface for RecordingSurface {
    fn set_html(&self, html: String) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        *self.html.lock().unwrap_or_else(PoisonError::into_inner) = Some(html);
        Ok(())
    }

    fn post_message(&self, message: &ViewerMessage) -> Result<(), SurfaceError> {
        self.ensure_open()?;
        self.posted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }

    fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<serde_json::Value>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn as_viewer_uri(&self, path: &Path) -> String {
        match Url::from_file_path(path) {
            Ok(url) => format!("{SANDBOX_SCHEME}://file{}", url.path()),
            Err(()) => format!("{SANDBOX_SCHEME}://file/{}", to_slash(path)),
        }
    }

    fn csp_source(&self) -> String {
        format!("{SANDBOX_SCHEME}:")
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_one(host: &RecordingHost) -> Arc<dyn ViewerSurface> {
        host.open(SurfaceOptions::new("Docs", vec![PathBuf::from("/docs")]))
            .expect("recording host opens surfaces")
    }

    #[test]
    fn host_records_opened_surfaces() {
        let host = RecordingHost::new();
        open_one(&host);
        let surfaces = host.surfaces();
        assert_eq!(surfaces.len(), 1);
        assert_eq!(surfaces[0].options().identifier, "sphinx");
        assert_eq!(surfaces[0].options().title, "Docs");
    }

    #[test]
    fn closed_surface_rejects_writes() {
        let host = RecordingHost::new();
        let surface = open_one(&host);
        host.surfaces()[0].close();

        assert!(surface.is_closed());
        assert!(matches!(surface.set_html("<p>".into()), Err(SurfaceError::Closed)));
        assert!(matches!(
            surface.post_message(&ViewerMessage::open_resource("x")),
            Err(SurfaceError::Closed)
        ));
        assert!(!host.surfaces()[0].send_from_viewer(json!({})));
    }

    #[test]
    fn inbound_receiver_is_handed_out_once() {
        let host = RecordingHost::new();
        let surface = open_one(&host);
        let mut rx = surface.take_inbound().expect("first take yields the receiver");
        assert!(surface.take_inbound().is_none());

        assert!(host.surfaces()[0].send_from_viewer(json!({ "type": "sphinx", "content": "a" })));
        assert_eq!(rx.try_recv().expect("message queued")["content"], "a");
    }

    #[cfg(unix)]
    #[test]
    fn viewer_uri_is_percent_encoded_file_path() {
        let host = RecordingHost::new();
        let surface = open_one(&host);
        assert_eq!(
            surface.as_viewer_uri(Path::new("/docs/_static/my style.css")),
            "docview-resource://file/docs/_static/my%20style.css"
        );
        assert_eq!(surface.csp_source(), "docview-resource:");
    }
}
