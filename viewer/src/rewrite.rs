//! HTML asset rewriting.
//!
//! A sandboxed surface cannot load `_static/style.css` relative to a document
//! it received as a string, so every local `href`/`src` value is resolved
//! against the document's directory and handed to a mapper that produces an
//! address the surface can load. Only the attribute value bytes change.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use docview_types::ServerConnectionInfo;
use docview_utils::{
    normalize_lexically, percent_decode, percent_encode_path, relative_path, to_slash,
};
use regex::Regex;
use url::Url;

use crate::surface::ViewerSurface;

/// Tag value reported when an attribute value is left alone because its quote
/// never closes.
pub const REWRITE_SKIPPED: &str = "RewriteSkipped";

static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();
static SCHEME: OnceLock<Regex> = OnceLock::new();
static HEAD_OPEN: OnceLock<Regex> = OnceLock::new();
static CSP_META: OnceLock<Regex> = OnceLock::new();
static CSP_META_TAG: OnceLock<Regex> = OnceLock::new();

fn attribute_regex() -> &'static Regex {
    // Groups: 1 double-quoted, 2 single-quoted, 3 unquoted, 4 a lone opening
    // quote (the value never terminates before the tag does).
    ATTRIBUTE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?:^|\s)(?:href|src)\s*=\s*(?:"([^"<>]*)"|'([^'<>]*)'|([^\s"'<>`=]+)|(["']))"#,
        )
        .expect("valid attribute regex")
    })
}

fn scheme_regex() -> &'static Regex {
    SCHEME.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").expect("valid scheme regex"))
}

fn head_open_regex() -> &'static Regex {
    HEAD_OPEN.get_or_init(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid head regex"))
}

fn csp_meta_regex() -> &'static Regex {
    CSP_META.get_or_init(|| {
        Regex::new(r#"(?i)<meta\s[^>]*http-equiv\s*=\s*["']?content-security-policy"#)
            .expect("valid CSP meta regex")
    })
}

fn csp_meta_tag_regex() -> &'static Regex {
    CSP_META_TAG.get_or_init(|| {
        Regex::new(r#"(?i)<meta\s[^>]*http-equiv\s*=\s*["']?content-security-policy[^>]*>"#)
            .expect("valid CSP meta tag regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Double,
    Single,
    None,
}

/// Rewrite every local `href`/`src` value in `html`.
///
/// Values with a URI scheme (`https:`, `data:`, `mailto:` ...), protocol-relative
/// `//host` values, root-relative `/path` values, fragment-only `#id` values and
/// empty values are kept as they are. A `?query` or `#fragment` suffix survives
/// the mapping.
pub fn rewrite(html: &str, base_dir: &Path, to_viewer_uri: impl Fn(&Path) -> String) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in attribute_regex().captures_iter(html) {
        let (value, quote) = if let Some(m) = caps.get(1) {
            (m, Quote::Double)
        } else if let Some(m) = caps.get(2) {
            (m, Quote::Single)
        } else if let Some(m) = caps.get(3) {
            (m, Quote::None)
        } else {
            if let Some(m) = caps.get(0) {
                tracing::debug!(
                    kind = REWRITE_SKIPPED,
                    offset = m.start(),
                    "Unterminated attribute value left untouched"
                );
            }
            continue;
        };

        let Some(mapped) = map_value(value.as_str(), base_dir, &to_viewer_uri) else {
            continue;
        };
        out.push_str(&html[last..value.start()]);
        out.push_str(&escape_for(&mapped, quote));
        last = value.end();
    }

    out.push_str(&html[last..]);
    out
}

fn is_excluded(value: &str) -> bool {
    value.is_empty()
        || value.starts_with('#')
        || value.starts_with('/')
        || scheme_regex().is_match(value)
}

fn map_value(value: &str, base_dir: &Path, to_viewer_uri: &impl Fn(&Path) -> String) -> Option<String> {
    let trimmed = value.trim();
    if is_excluded(trimmed) {
        return None;
    }

    let split = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    let (path_part, suffix) = trimmed.split_at(split);
    if path_part.is_empty() {
        // `?page=2` and friends address the document itself.
        return None;
    }
    let decoded = percent_decode(path_part).map_or(Cow::Borrowed(path_part), Cow::Owned);
    let absolute = normalize_lexically(&base_dir.join(decoded.as_ref()));

    let mut mapped = to_viewer_uri(&absolute);
    match suffix.strip_prefix('?') {
        Some(query) if mapped.contains('?') => {
            mapped.push('&');
            mapped.push_str(query);
        }
        _ => mapped.push_str(suffix),
    }
    Some(mapped)
}

fn escape_for(value: &str, quote: Quote) -> Cow<'_, str> {
    match quote {
        Quote::Double if value.contains('"') => Cow::Owned(value.replace('"', "&quot;")),
        Quote::Single if value.contains('\'') => Cow::Owned(value.replace('\'', "&#39;")),
        _ => Cow::Borrowed(value),
    }
}

/// Insert a `Content-Security-Policy` meta tag right after the first `<head>`.
///
/// Documents without a `<head>`, or that already declare a policy, are
/// returned unchanged.
#[must_use]
pub fn inject_csp(html: &str, policy: &str) -> String {
    if csp_meta_regex().is_match(html) {
        return html.to_string();
    }
    let Some(head) = head_open_regex().find(html) else {
        return html.to_string();
    };

    let mut out = String::with_capacity(html.len() + policy.len() + 64);
    out.push_str(&html[..head.end()]);
    push_csp_meta(&mut out, policy);
    out.push_str(&html[head.end()..]);
    out
}

fn push_csp_meta(out: &mut String, policy: &str) {
    let policy = policy.replace('&', "&amp;").replace('"', "&quot;");
    out.push_str(r#"<meta http-equiv="Content-Security-Policy" content=""#);
    out.push_str(&policy);
    out.push_str(r#"">"#);
}

/// Replace the document's `Content-Security-Policy` meta tag with `policy`,
/// or insert one after `<head>` when there is none.
#[must_use]
pub fn replace_csp(html: &str, policy: &str) -> String {
    match csp_meta_tag_regex().find(html) {
        Some(tag) => {
            let mut out = String::with_capacity(html.len() + policy.len());
            out.push_str(&html[..tag.start()]);
            push_csp_meta(&mut out, policy);
            out.push_str(&html[tag.end()..]);
            out
        }
        None => inject_csp(html, policy),
    }
}

/// Extend every directive of `policy` with `source`.
///
/// A surface whose own origin differs from where rewritten assets live needs
/// that origin admitted explicitly; `'self'` alone would block them.
#[must_use]
pub fn policy_admitting(policy: &str, source: &str) -> String {
    policy
        .split(';')
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .map(|directive| {
            if directive.split_whitespace().any(|token| token == source) {
                format!("{directive};")
            } else {
                format!("{directive} {source};")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode a document read from disk. Invalid UTF-8 is replaced and reported,
/// never passed through silently.
pub(crate) fn decode_document(bytes: Vec<u8>, path: &Path) -> String {
    match String::from_utf8(bytes) {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(
                document = %path.display(),
                offset = e.utf8_error().valid_up_to(),
                "Document is not valid UTF-8; invalid bytes were replaced"
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Mapper addressing files through the embedded server.
///
/// Files under `root` get plain root-relative URLs; anything else goes through
/// the `fsPath` override.
pub fn server_uri_mapper(
    info: &ServerConnectionInfo,
    root: &Path,
) -> impl Fn(&Path) -> String + use<> {
    let info = info.clone();
    let root = normalize_lexically(root);
    move |path: &Path| match path.strip_prefix(&root) {
        Ok(relative) => info.root_url(&percent_encode_path(&to_slash(relative))),
        Err(_) => info.fs_path_url(path),
    }
}

/// Mapper minting sandbox URIs from the surface itself.
pub fn sandbox_uri_mapper(surface: &dyn ViewerSurface) -> impl Fn(&Path) -> String + '_ {
    move |path: &Path| surface.as_viewer_uri(path)
}

/// Mapper producing URLs relative to `from_dir`, for documents written to disk.
///
/// `remap` lets the caller redirect targets that get copied next to the
/// output. Targets that share no root with `from_dir` fall back to `file:` URLs.
pub fn relative_uri_mapper<R>(from_dir: &Path, remap: R) -> impl Fn(&Path) -> String + use<R>
where
    R: Fn(&Path) -> Option<PathBuf>,
{
    let from_dir = normalize_lexically(from_dir);
    move |path: &Path| {
        let target = remap(path).unwrap_or_else(|| path.to_path_buf());
        match relative_path(&from_dir, &target) {
            Some(relative) => percent_encode_path(&to_slash(&relative)),
            None => Url::from_file_path(&target)
                .map_or_else(|()| to_slash(&target), String::from),
        }
    }
}
