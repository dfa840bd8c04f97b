//! Request-side types: what the server was asked for, what it resolved to,
//! and where the server can be reached.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use url::Url;

/// Query parameter carrying an explicit filesystem path override.
pub const FS_PATH_PARAM: &str = "fsPath";

/// Host the embedded server advertises. It only ever binds loopback.
pub const LOCALHOST: &str = "localhost";

/// One inbound request for a document asset.
///
/// Created per HTTP request and discarded once the response is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    requested_path: String,
    query_params: BTreeMap<String, String>,
}

impl DocumentRequest {
    #[must_use]
    pub fn new(requested_path: impl Into<String>, query_params: BTreeMap<String, String>) -> Self {
        Self {
            requested_path: requested_path.into(),
            query_params,
        }
    }

    /// Request for a root-relative path with no query.
    #[must_use]
    pub fn for_path(requested_path: impl Into<String>) -> Self {
        Self::new(requested_path, BTreeMap::new())
    }

    /// Request addressing an absolute file through the `fsPath` override.
    #[must_use]
    pub fn for_fs_path(fs_path: &Path) -> Self {
        let mut query_params = BTreeMap::new();
        query_params.insert(
            FS_PATH_PARAM.to_string(),
            fs_path.to_string_lossy().into_owned(),
        );
        let name = fs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(format!("/{name}"), query_params)
    }

    #[must_use]
    pub fn requested_path(&self) -> &str {
        &self.requested_path
    }

    #[must_use]
    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query_params
    }

    /// The explicit `fsPath` override, if one was granted and is non-empty.
    #[must_use]
    pub fn fs_path_override(&self) -> Option<&str> {
        self.query_params
            .get(FS_PATH_PARAM)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// A request mapped onto a concrete file.
///
/// `absolute_path` is always normalized. Unless the request carried an
/// explicit override it lies beneath the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    absolute_path: PathBuf,
    mime_type: &'static str,
    exists: bool,
}

impl ResolvedAsset {
    #[must_use]
    pub fn new(absolute_path: PathBuf, mime_type: &'static str, exists: bool) -> Self {
        Self {
            absolute_path,
            mime_type,
            exists,
        }
    }

    #[must_use]
    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }
}

/// Where the embedded server is listening.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerConnectionInfo {
    host: &'static str,
    port: u16,
}

impl ServerConnectionInfo {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            host: LOCALHOST,
            port,
        }
    }

    #[must_use]
    pub fn host(&self) -> &'static str {
        self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// URL serving `relative` beneath the document root.
    #[must_use]
    pub fn root_url(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url(), relative.trim_start_matches('/'))
    }

    /// URL serving an absolute file through the `fsPath` override.
    ///
    /// The path segment carries the file name so browsers pick sensible
    /// relative bases and download names; the server only reads the query.
    #[must_use]
    pub fn fs_path_url(&self, fs_path: &Path) -> String {
        let name = fs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match Url::parse(&self.base_url()) {
            Ok(mut url) => {
                url.set_path(&format!("/{name}"));
                url.query_pairs_mut()
                    .append_pair(FS_PATH_PARAM, &fs_path.to_string_lossy());
                url.to_string()
            }
            Err(_) => self.root_url(&name),
        }
    }
}
