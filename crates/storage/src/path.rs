//! Path validation.
//!
//! Every backend resolves caller-supplied paths relative to its own root, so
//! this is the one place that stops a path from climbing out of it.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a storage path.
///
/// `..` components are resolved lexically and must never leave the root.
/// Leading `/`, `.` components, repeated separators and trailing slashes are
/// dropped. Null bytes and empty results are rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use stacks_storage::validate_path;
/// assert!(validate_path("github.com/foo/bar.git/config").is_ok());
/// assert!(validate_path("objects/../refs/main").is_ok());
/// assert!(validate_path("../outside").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("/github.com//foo/./bar.git/").unwrap(),
///     Path::new("github.com/foo/bar.git")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}
