//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Storage failures are re-raised on top of the original
//! storage error so the full chain survives.

use derive_more::{Display, Error};
use stacks_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use std::io::Error as IoError;
use std::path::PathBuf;

use crate::id::{LibraryId, LocationId, RepositoryId};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("library {_0} already exists")]
    LibraryExists(#[error(not(source))] LibraryId),
    #[display("library {_0} not exists")]
    LibraryNotExists(#[error(not(source))] LibraryId),
    #[display("location {_0} already exists")]
    LocationExists(#[error(not(source))] LocationId),
    #[display("location {_0} not exists")]
    LocationNotExists(#[error(not(source))] LocationId),
    #[display("repository {_0} already exists")]
    RepositoryExists(#[error(not(source))] RepositoryId),
    #[display("repository {_0} not exists")]
    RepositoryNotExists(#[error(not(source))] RepositoryId),
    /// The library has nowhere to create a repository.
    #[display("library {_0} has no locations")]
    NoLocations(#[error(not(source))] LibraryId),
    #[display("repository mode {_0:?} not supported")]
    ModeNotSupported(#[error(not(source))] String),
    #[display("invalid endpoint {_0:?}")]
    InvalidEndpoint(#[error(not(source))] String),
    #[display("cannot commit: deployment is not transactional")]
    NonTransactional,
    #[display("cannot commit: nothing staged")]
    EmptyCommit,
    #[display("not implemented: {_0}")]
    NotImplemented(#[error(not(source))] &'static str),
    #[display("read-only repository: refusing to modify {}", _0.display())]
    ReadOnlyViolation(#[error(not(source))] PathBuf),
    #[display("deadline exceeded")]
    DeadlineExceeded,
    /// Repository metadata exists but can't be understood.
    #[display("corrupt repository data: {_0}")]
    Corrupt(#[error(not(source))] String),
    #[display("storage failure")]
    Storage,
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl ErrorKind {
    /// Returns `true` for the answers an aggregated search treats as "not
    /// here, keep looking".
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::RepositoryNotExists(_) | Self::LocationNotExists(_))
    }
}

/// Re-raise a storage error as a library error, keeping the storage error as
/// its child.
pub(crate) fn storage(err: StorageError) -> Error {
    let kind = match &*err {
        StorageErrorKind::ReadOnly(path) => ErrorKind::ReadOnlyViolation(path.clone()),
        StorageErrorKind::EmptyCommit => ErrorKind::EmptyCommit,
        _ => ErrorKind::Storage,
    };
    err.raise(kind)
}
