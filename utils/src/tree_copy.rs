//! Deterministic recursive directory copy.
//!
//! Entries are visited in byte-wise file name order so two copies of the same
//! tree produce the same manifest and the same bytes on disk. Symlinks are
//! skipped rather than followed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One file written by [`copy_tree`], relative to the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    pub relative: PathBuf,
    pub bytes: u64,
}

/// Copy every regular file under `src` into `dst`, creating directories as needed.
///
/// Existing files in `dst` with the same relative path are overwritten.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<Vec<CopiedFile>> {
    let mut copied = Vec::new();
    copy_dir(src, dst, Path::new(""), &mut copied)?;
    Ok(copied)
}

fn copy_dir(
    src: &Path,
    dst: &Path,
    relative: &Path,
    copied: &mut Vec<CopiedFile>,
) -> io::Result<()> {
    fs::create_dir_all(dst.join(relative))?;

    let mut entries = fs::read_dir(src.join(relative))?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let rel = relative.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "Skipping symlink during tree copy");
            continue;
        }
        if file_type.is_dir() {
            copy_dir(src, dst, &rel, copied)?;
        } else if file_type.is_file() {
            let bytes = fs::copy(entry.path(), dst.join(&rel))?;
            copied.push(CopiedFile {
                relative: rel,
                bytes,
            });
        }
    }
    Ok(())
}
