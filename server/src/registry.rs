//! In-memory content registered by the viewer bridge.
//!
//! The bridge registers the rewritten root document under its filesystem
//! path so the server hands out the rewritten copy instead of the original
//! bytes on disk. Lookups happen before disk resolution. Each registration
//! carries a generation so a session only releases the entry it registered.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use docview_utils::normalize_lexically;
use tokio::sync::RwLock;

/// Bytes plus the content type to serve them with.
#[derive(Debug, Clone)]
pub struct RegisteredContent {
    pub bytes: Arc<[u8]>,
    pub content_type: Cow<'static, str>,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct ContentRegistry {
    entries: RwLock<HashMap<PathBuf, RegisteredContent>>,
    next_generation: AtomicU64,
}

impl ContentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the content served for `path`. Returns the
    /// generation to hand back to [`ContentRegistry::release`].
    pub async fn register(
        &self,
        path: &Path,
        bytes: impl Into<Arc<[u8]>>,
        content_type: impl Into<Cow<'static, str>>,
    ) -> u64 {
        let key = normalize_lexically(path);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(path = %key.display(), generation, "Registered in-memory content");
        self.entries.write().await.insert(
            key,
            RegisteredContent {
                bytes: bytes.into(),
                content_type: content_type.into(),
                generation,
            },
        );
        generation
    }

    /// Remove `path` only if it still holds `generation`. A later
    /// registration of the same path survives an earlier session's release.
    pub async fn release(&self, path: &Path, generation: u64) -> bool {
        let key = normalize_lexically(path);
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|entry| entry.generation == generation) {
            entries.remove(&key);
            tracing::debug!(path = %key.display(), generation, "Released in-memory content");
            true
        } else {
            false
        }
    }

    pub async fn unregister(&self, path: &Path) -> bool {
        self.entries
            .write()
            .await
            .remove(&normalize_lexically(path))
            .is_some()
    }

    pub async fn get(&self, path: &Path) -> Option<RegisteredContent> {
        self.entries
            .read()
            .await
            .get(&normalize_lexically(path))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
