//! Single-flight ownership of the embedded server.
//!
//! At most one [`RunningServer`] exists per slot. Concurrent callers of
//! [`ServerSlot::get_or_start`] serialize on the slot lock: the first one
//! starts the server and the rest observe the stored instance. A failed start
//! leaves the slot empty so a later call can retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use docview_types::ServerConnectionInfo;
use tokio::sync::Mutex;

use crate::server::{RunningServer, ServerError, ServerOptions};

#[derive(Debug, Default)]
pub struct ServerSlot {
    inner: Mutex<Option<Arc<RunningServer>>>,
    starts: AtomicUsize,
}

static GLOBAL: OnceLock<Arc<ServerSlot>> = OnceLock::new();

impl ServerSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide slot.
    #[must_use]
    pub fn global() -> Arc<ServerSlot> {
        GLOBAL.get_or_init(|| Arc::new(ServerSlot::new())).clone()
    }

    /// Return the running server, starting it with `options` if the slot is empty.
    ///
    /// Once a server runs, later `options` are ignored; the first successful
    /// start decides the root and port for the life of the slot.
    pub async fn get_or_start(
        &self,
        options: &ServerOptions,
    ) -> Result<Arc<RunningServer>, ServerError> {
        let mut guard = self.inner.lock().await;
        if let Some(server) = guard.as_ref() {
            if server.root() != options.root {
                tracing::debug!(
                    running = %server.root().display(),
                    requested = %options.root.display(),
                    "Reusing running server for a different root"
                );
            }
            return Ok(server.clone());
        }

        let server = Arc::new(RunningServer::start(options).await?);
        self.starts.fetch_add(1, Ordering::Relaxed);
        *guard = Some(server.clone());
        Ok(server)
    }

    pub async fn current(&self) -> Option<Arc<RunningServer>> {
        self.inner.lock().await.clone()
    }

    pub async fn connection_info(&self) -> Option<ServerConnectionInfo> {
        self.current()
            .await
            .map(|server| server.connection_info().clone())
    }

    /// Stop the server, if any, and empty the slot.
    pub async fn shutdown(&self) {
        let server = self.inner.lock().await.take();
        if let Some(server) = server {
            server.shutdown().await;
        }
    }

    /// Number of servers this slot has started.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_server() {
        let dir = tempdir().expect("temp dir");
        let slot = Arc::new(ServerSlot::new());
        let options = ServerOptions::new(dir.path());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = slot.clone();
                let options = options.clone();
                tokio::spawn(async move { slot.get_or_start(&options).await.expect("server starts") })
            })
            .collect();

        let mut ports = Vec::new();
        for handle in handles {
            ports.push(handle.await.expect("task joins").connection_info().port());
        }

        assert_eq!(slot.start_count(), 1);
        assert!(ports.windows(2).all(|w| w[0] == w[1]));
        slot.shutdown().await;
    }

    #[tokio::test]
    async fn failed_start_leaves_slot_empty() {
        let dir = tempdir().expect("temp dir");
        let slot = ServerSlot::new();
        let missing = ServerOptions::new(dir.path().join("nope"));

        assert!(slot.get_or_start(&missing).await.is_err());
        assert!(slot.current().await.is_none());
        assert_eq!(slot.start_count(), 0);

        let server = slot.get_or_start(&ServerOptions::new(dir.path())).await.expect("server starts");
        assert_ne!(server.connection_info().port(), 0);
        assert_eq!(slot.start_count(), 1);
        slot.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_empties_slot_and_allows_restart() {
        let dir = tempdir().expect("temp dir");
        let slot = ServerSlot::new();
        let options = ServerOptions::new(dir.path());

        slot.get_or_start(&options).await.expect("server starts");
        slot.shutdown().await;
        assert!(slot.connection_info().await.is_none());

        slot.get_or_start(&options).await.expect("server starts");
        assert_eq!(slot.start_count(), 2);
        slot.shutdown().await;
    }
}
