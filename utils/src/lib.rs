//! Shared utilities for docview.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`paths`**: Lexical normalization and URL path decoding
//! - **`tree_copy`**: Deterministic recursive directory copies

pub mod atomic_write;
pub mod paths;
pub mod tree_copy;

pub use atomic_write::{FileSyncPolicy, atomic_write, atomic_write_with_policy};
pub use paths::{
    normalize_lexically, percent_decode, percent_encode_path, relative_path, to_slash,
};
pub use tree_copy::{CopiedFile, copy_tree};
