//! Content responder: turns a resolved asset (or a miss) into a response.
//!
//! Bodies are raw bytes. Nothing here decodes file contents, so images and
//! fonts round-trip unchanged.

use std::borrow::Cow;
use std::io;

use docview_types::ResolvedAsset;
use tokio::fs;

use crate::mime::HTML_UTF8;
use crate::registry::RegisteredContent;

/// Policy applied to every response and injected into viewed documents.
///
/// Same-origin and `data:` resources only, with inline script and style
/// allowed because generated documentation relies on both.
pub const DEFAULT_CSP: &str = "default-src 'self' data:; img-src 'self' data:; \
media-src 'self' data:; script-src 'unsafe-inline' 'self'; style-src 'unsafe-inline' 'self';";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }

    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
        }
    }
}

/// A complete response, ready to be written to the wire.
#[derive(Debug, Clone)]
pub struct ContentResult {
    pub status: Status,
    pub content_type: Cow<'static, str>,
    pub headers: Vec<(&'static str, Cow<'static, str>)>,
    pub body: Vec<u8>,
}

impl ContentResult {
    fn new(status: Status, content_type: impl Into<Cow<'static, str>>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: default_headers(),
            body,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<Cow<'static, str>>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }
}

/// Headers attached to every response, success or not.
#[must_use]
pub fn default_headers() -> Vec<(&'static str, Cow<'static, str>)> {
    vec![
        ("Cache-Control", Cow::Borrowed("no-cache")),
        ("X-Content-Type-Options", Cow::Borrowed("nosniff")),
        ("Access-Control-Allow-Origin", Cow::Borrowed("*")),
        ("Content-Security-Policy", Cow::Borrowed(DEFAULT_CSP)),
    ]
}

/// Read `asset` from disk and build a 200 response, or a 404 page when the
/// file is gone or unreadable.
pub async fn respond(asset: &ResolvedAsset) -> ContentResult {
    let path = asset.absolute_path();
    if !asset.exists() {
        return not_found(&path.to_string_lossy());
    }
    match fs::read(path).await {
        Ok(bytes) => ContentResult::new(Status::Ok, asset.mime_type(), bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Asset vanished before read");
            not_found(&path.to_string_lossy())
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to read asset: {e}");
            not_found(&path.to_string_lossy())
        }
    }
}

/// Serve bytes registered in memory.
#[must_use]
pub fn registered(content: &RegisteredContent) -> ContentResult {
    ContentResult::new(
        Status::Ok,
        content.content_type.clone(),
        content.bytes.to_vec(),
    )
}

/// Placeholder page naming the path that could not be served.
#[must_use]
pub fn not_found(requested: &str) -> ContentResult {
    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Page not found</title></head>\n\
<body>\n<h1>Page not found</h1>\n<p>{}</p>\n</body>\n</html>\n",
        escape_html(requested)
    );
    ContentResult::new(Status::NotFound, HTML_UTF8, body.into_bytes())
}

#[must_use]
pub fn bad_request(reason: &str) -> ContentResult {
    ContentResult::new(
        Status::BadRequest,
        "text/plain; charset=UTF-8",
        format!("Bad request: {reason}\n").into_bytes(),
    )
}

#[must_use]
pub fn method_not_allowed() -> ContentResult {
    ContentResult::new(
        Status::MethodNotAllowed,
        "text/plain; charset=UTF-8",
        b"Method not allowed\n".to_vec(),
    )
    .with_header("Allow", "GET, HEAD")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[tokio::test]
    async fn respond_returns_exact_binary_bytes() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("logo.png");
        let bytes: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff, 0x00, 0xfe];
        fs::write(&path, &bytes).expect("write fixture");

        let result = respond(&ResolvedAsset::new(path, "image/png", true)).await;
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.content_type, "image/png");
        assert_eq!(result.body, bytes);
    }

    #[tokio::test]
    async fn respond_missing_file_is_not_found_page() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("gone.html");

        let result = respond(&ResolvedAsset::new(path, HTML_UTF8, true)).await;
        assert_eq!(result.status, Status::NotFound);
        assert_eq!(result.content_type, "text/html; charset=UTF-8");
        assert!(String::from_utf8(result.body).expect("utf-8 body").contains("gone.html"));
    }

    #[tokio::test]
    async fn respond_skips_read_for_nonexistent_asset() {
        let asset = ResolvedAsset::new(PathBuf::from("/nope"), HTML_UTF8, false);
        assert_eq!(respond(&asset).await.status, Status::NotFound);
    }

    #[test]
    fn not_found_escapes_requested_path() {
        let body = String::from_utf8(not_found("/<script>x</script>").body).expect("utf-8 body");
        assert!(body.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[test]
    fn every_response_carries_default_headers() {
        for result in [not_found("/x"), bad_request("bad"), method_not_allowed()] {
            assert_eq!(result.header("cache-control"), Some("no-cache"));
            assert_eq!(result.header("X-Content-Type-Options"), Some("nosniff"));
            assert_eq!(result.header("Content-Security-Policy"), Some(DEFAULT_CSP));
        }
    }

    #[test]
    fn method_not_allowed_advertises_allowed_methods() {
        let result = method_not_allowed();
        assert_eq!(result.status.code(), 405);
        assert_eq!(result.header("Allow"), Some("GET, HEAD"));
    }
}
