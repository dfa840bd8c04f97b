//! Extension → MIME type table.

use std::path::Path;

/// Fallback for extensions missing from the table.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type of HTML documents and synthesized error pages.
pub const HTML_UTF8: &str = "text/html; charset=UTF-8";

const MIME_TABLE: &[(&str, &str)] = &[
    ("html", HTML_UTF8),
    ("htm", HTML_UTF8),
    ("js", "text/javascript; charset=UTF-8"),
    ("mjs", "text/javascript; charset=UTF-8"),
    ("css", "text/css; charset=UTF-8"),
    ("txt", "text/plain; charset=UTF-8"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("eot", "application/vnd.ms-fontobject"),
];

/// MIME type for `path`, judged purely by its extension (case-insensitive).
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return OCTET_STREAM;
    };
    MIME_TABLE
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map_or(OCTET_STREAM, |&(_, mime)| mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_entry_maps_exactly() {
        for (ext, mime) in MIME_TABLE {
            let name = format!("file.{ext}");
            assert_eq!(content_type_for(Path::new(&name)), *mime, "extension {ext}");
        }
    }

    #[test]
    fn required_types() {
        assert_eq!(content_type_for(Path::new("a.html")), "text/html; charset=UTF-8");
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.gif")), "image/gif");
        assert!(content_type_for(Path::new("a.css")).starts_with("text/css"));
        assert!(content_type_for(Path::new("a.js")).starts_with("text/javascript"));
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(content_type_for(Path::new("LOGO.PNG")), "image/png");
    }

    #[test]
    fn unknown_extensions_fall_back() {
        for name in ["archive.tar.zst", "noext", "weird.pnG2", ".hidden", "x."] {
            assert_eq!(content_type_for(Path::new(name)), OCTET_STREAM, "{name}");
        }
    }
}
