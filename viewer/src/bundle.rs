//! Static bundle staging.
//!
//! Writes a self-contained copy of a document next to its assets: a rewritten
//! `index.html` whose references are relative to the bundle, plus a copy of
//! the document's sibling `_static` directory. Staging the same inputs twice
//! produces the same bytes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use docview_server::DEFAULT_CSP;
use docview_utils::{atomic_write, copy_tree};
use thiserror::Error;

use crate::rewrite::{decode_document, inject_csp, relative_uri_mapper, rewrite};

pub const BUNDLE_INDEX: &str = "index.html";
pub const STATIC_DIR: &str = "_static";

/// Bundle directory used when none is configured: `<document dir>/_docview`.
pub const DEFAULT_BUNDLE_DIR_NAME: &str = "_docview";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("document has no parent directory: {0}")]
    NoParent(PathBuf),
    #[error("bundle index {0} would overwrite the source document")]
    OverwritesSource(PathBuf),
    #[error("bundle directory {0} lies inside the static assets it copies")]
    NestedInStatic(PathBuf),
}

/// What a staging run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleManifest {
    pub dir: PathBuf,
    pub index: PathBuf,
    /// Files written, relative to `dir`, in write order.
    pub files: Vec<PathBuf>,
}

#[must_use]
pub fn default_bundle_dir(document: &Path) -> Option<PathBuf> {
    document.parent().map(|dir| dir.join(DEFAULT_BUNDLE_DIR_NAME))
}

/// Read `document` and stage it into `bundle_dir`.
pub fn stage_bundle(document: &Path, bundle_dir: &Path) -> Result<BundleManifest, BundleError> {
    let bytes = fs::read(document).map_err(|source| BundleError::Read {
        path: document.to_path_buf(),
        source,
    })?;
    stage_bundle_html(document, &decode_document(bytes, document), bundle_dir)
}

/// Stage already-read document `html` into `bundle_dir`.
pub fn stage_bundle_html(
    document: &Path,
    html: &str,
    bundle_dir: &Path,
) -> Result<BundleManifest, BundleError> {
    let document = fs::canonicalize(document).map_err(|source| BundleError::Read {
        path: document.to_path_buf(),
        source,
    })?;
    let doc_dir = document
        .parent()
        .ok_or_else(|| BundleError::NoParent(document.clone()))?
        .to_path_buf();

    fs::create_dir_all(bundle_dir).map_err(|source| BundleError::Write {
        path: bundle_dir.to_path_buf(),
        source,
    })?;
    let bundle_dir = fs::canonicalize(bundle_dir).map_err(|source| BundleError::Write {
        path: bundle_dir.to_path_buf(),
        source,
    })?;

    let index = bundle_dir.join(BUNDLE_INDEX);
    if index == document {
        return Err(BundleError::OverwritesSource(index));
    }
    let source_static = doc_dir.join(STATIC_DIR);
    let bundle_static = bundle_dir.join(STATIC_DIR);
    if bundle_dir.starts_with(&source_static) {
        return Err(BundleError::NestedInStatic(bundle_dir));
    }

    let remap_static = {
        let source_static = source_static.clone();
        let bundle_static = bundle_static.clone();
        move |target: &Path| {
            target
                .strip_prefix(&source_static)
                .ok()
                .map(|rest| bundle_static.join(rest))
        }
    };
    let rewritten = rewrite(html, &doc_dir, relative_uri_mapper(&bundle_dir, remap_static));
    let rendered = inject_csp(&rewritten, DEFAULT_CSP);

    atomic_write(&index, rendered.as_bytes()).map_err(|source| BundleError::Write {
        path: index.clone(),
        source,
    })?;
    let mut files = vec![PathBuf::from(BUNDLE_INDEX)];

    if source_static.is_dir() && source_static != bundle_static {
        let copied = copy_tree(&source_static, &bundle_static).map_err(|source| {
            BundleError::Write {
                path: bundle_static.clone(),
                source,
            }
        })?;
        files.extend(
            copied
                .into_iter()
                .map(|file| Path::new(STATIC_DIR).join(file.relative)),
        );
    }

    tracing::info!(
        document = %document.display(),
        bundle = %bundle_dir.display(),
        files = files.len(),
        "Staged documentation bundle"
    );
    Ok(BundleManifest {
        dir: bundle_dir,
        index,
        files,
    })
}
