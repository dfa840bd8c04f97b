//! Path resolution: maps a [`DocumentRequest`] onto a file beneath the
//! document root.
//!
//! Containment is enforced twice: lexically on the joined path, and again on
//! the canonical path so a symlink inside the root cannot point outside it.
//! Only an explicit `fsPath` override may address files elsewhere.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use docview_types::{DocumentRequest, ResolvedAsset};
use docview_utils::{normalize_lexically, percent_decode};
use thiserror::Error;

use crate::mime::content_type_for;

/// File served when a request names a directory.
pub const DIRECTORY_INDEX: &str = "index.html";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("not found: {requested}")]
    NotFound { requested: String },
    #[error(
        "path escapes document root (attempted: {}, resolved: {})",
        attempted.display(),
        resolved.display()
    )]
    OutsideRoot { attempted: PathBuf, resolved: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document root {} is not a readable directory", .0.display())]
    InvalidRoot(PathBuf),
}

impl ResolveError {
    /// Whether the request should be answered as an ordinary miss.
    ///
    /// Escapes are reported as misses so the response does not reveal what
    /// exists outside the root.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::OutsideRoot { .. })
    }
}

/// Canonical document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRoot {
    root: PathBuf,
}

impl DocRoot {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let root = root.as_ref();
        let canonical =
            fs::canonicalize(root).map_err(|_| ResolveError::InvalidRoot(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(ResolveError::InvalidRoot(root.to_path_buf()));
        }
        Ok(Self { root: canonical })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Lexical target of a request, before any filesystem access.
    ///
    /// Used for registry lookups, which may name files that do not exist.
    pub fn target_of(&self, request: &DocumentRequest) -> Result<(PathBuf, bool), ResolveError> {
        if let Some(fs_path) = request.fs_path_override() {
            reject_unsafe(fs_path)?;
            let candidate = PathBuf::from(fs_path);
            if candidate.is_absolute() {
                return Ok((normalize_lexically(&candidate), true));
            }
            // A relative override gets no special treatment.
            return self.join_contained(fs_path, fs_path).map(|p| (p, false));
        }

        let requested = request.requested_path();
        let decoded = percent_decode(requested).ok_or_else(|| ResolveError::NotFound {
            requested: requested.to_string(),
        })?;
        reject_unsafe(&decoded)?;
        self.join_contained(&decoded, requested).map(|p| (p, false))
    }

    fn join_contained(&self, relative: &str, requested: &str) -> Result<PathBuf, ResolveError> {
        let relative = relative.trim_start_matches(['/', '\\']);
        let joined = self.root.join(relative);
        let normalized = normalize_lexically(&joined);
        if !self.contains(&normalized) {
            tracing::debug!(requested, "Rejected lexical escape from document root");
            return Err(ResolveError::OutsideRoot {
                attempted: joined,
                resolved: normalized,
            });
        }
        Ok(normalized)
    }
}

/// Resolve `request` against `root`.
///
/// An `fsPath` query parameter names an absolute file directly; otherwise the
/// request path is joined onto the root. Directories resolve to their
/// `index.html`. Missing files and escapes from the root fail.
pub fn resolve(request: &DocumentRequest, root: &DocRoot) -> Result<ResolvedAsset, ResolveError> {
    let (mut candidate, overridden) = root.target_of(request)?;

    let mut meta = metadata(&candidate, request)?;
    if meta.is_dir() {
        candidate.push(DIRECTORY_INDEX);
        meta = metadata(&candidate, request)?;
    }
    if !meta.is_file() {
        return Err(not_found(request));
    }

    let canonical = fs::canonicalize(&candidate).map_err(|e| io_error(&candidate, request, e))?;
    if !overridden && !root.contains(&canonical) {
        return Err(ResolveError::OutsideRoot {
            attempted: candidate,
            resolved: canonical,
        });
    }

    let mime = content_type_for(&canonical);
    Ok(ResolvedAsset::new(canonical, mime, true))
}

fn metadata(path: &Path, request: &DocumentRequest) -> Result<fs::Metadata, ResolveError> {
    fs::metadata(path).map_err(|e| io_error(path, request, e))
}

fn io_error(path: &Path, request: &DocumentRequest, err: io::Error) -> ResolveError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => not_found(request),
        _ => ResolveError::ReadFailure {
            path: path.to_path_buf(),
            source: err,
        },
    }
}

fn not_found(request: &DocumentRequest) -> ResolveError {
    ResolveError::NotFound {
        requested: request
            .fs_path_override()
            .unwrap_or(request.requested_path())
            .to_string(),
    }
}

fn reject_unsafe(path: &str) -> Result<(), ResolveError> {
    if path.chars().any(is_unsafe_path_char) {
        return Err(ResolveError::NotFound {
            requested: path.escape_debug().to_string(),
        });
    }
    Ok(())
}

/// C0/C1 control characters and DEL never appear in served paths.
fn is_unsafe_path_char(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001f}' | '\u{007f}' | '\u{0080}'..='\u{009f}')
}
