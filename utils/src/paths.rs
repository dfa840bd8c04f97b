//! Path helpers shared by the resolver and the HTML rewriter.

use std::path::{Component, Path, PathBuf};
use std::str;

/// Collapse `.` and `..` components without touching the filesystem.
///
/// `..` at the root is dropped, so the result never climbs above the first
/// root or prefix component.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(c),
            },
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// Render a relative path with `/` separators, as URLs expect.
///
/// Root and prefix components are dropped; `..` is kept.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode `%XX` escapes in a URL path.
///
/// Unlike form decoding, `+` is kept literally. Returns `None` for truncated
/// or non-hex escapes and for byte sequences that are not UTF-8.
#[must_use]
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Encode a `/`-separated path for use in a URL path.
///
/// Unreserved characters and `/` pass through; everything else becomes `%XX`.
#[must_use]
pub fn percent_encode_path(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'/') {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(b >> 4)]));
            out.push(char::from(HEX[usize::from(b & 0x0f)]));
        }
    }
    out
}

/// Path of `target` relative to the directory `from_dir`, using `..` as needed.
///
/// Both inputs are normalized lexically first. Returns `None` when they do not
/// share a root (different Windows prefixes, or one absolute and one relative).
#[must_use]
pub fn relative_path(from_dir: &Path, target: &Path) -> Option<PathBuf> {
    let from = normalize_lexically(from_dir);
    let target = normalize_lexically(target);
    if from.has_root() != target.has_root() {
        return None;
    }

    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = target.components().collect();
    if let (Some(Component::Prefix(a)), Some(Component::Prefix(b))) = (from.first(), to.first())
        && a != b
    {
        return None;
    }

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for c in &to[common..] {
        out.push(c.as_os_str());
    }
    Some(out)
}
