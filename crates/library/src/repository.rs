//! Repository handles.

use stacks_storage::backend::CommitSummary;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::error::{ErrorKind, Result, storage};
use crate::id::{LocationId, RepositoryId};
use crate::mode::Mode;
use crate::object::ObjectStore;
use crate::storer::Overlay;

/// An open repository.
///
/// A handle is owned by a single caller. Write sessions end with either
/// [`commit`](Self::commit) or [`close`](Self::close); both consume the handle.
/// Dropping a handle without either behaves like `close`: staged writes are
/// thrown away together with the temporary directory.
pub struct Repository {
    id: RepositoryId,
    location: LocationId,
    mode: Mode,
    transactional: bool,
    store: ObjectStore,
    overlay: Option<Overlay>,
}

impl Repository {
    pub(crate) fn new(
        id: RepositoryId,
        location: LocationId,
        mode: Mode,
        transactional: bool,
        store: ObjectStore,
        overlay: Option<Overlay>,
    ) -> Self {
        Self {
            id,
            location,
            mode,
            transactional,
            store,
            overlay,
        }
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    /// The location this repository was opened from.
    pub fn location_id(&self) -> &LocationId {
        &self.location
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The underlying object store, for everything beyond handle lifecycle.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Directory holding this session's staged writes, if there is one.
    pub fn temporary_path(&self) -> Option<&Path> {
        self.overlay.as_ref().map(|overlay| overlay.temporary.path())
    }

    /// Apply every staged write to the permanent repository, then release the
    /// temporary directory.
    ///
    /// The merge is all-or-nothing: if it fails part way, the permanent
    /// repository is put back the way it was.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NonTransactional`] if the deployment isn't
    ///   transactional.
    /// - [`ErrorKind::ReadOnlyViolation`] if the handle was opened read-only.
    /// - [`ErrorKind::EmptyCommit`] if nothing was written. The temporary
    ///   directory is released regardless.
    #[instrument(skip(self), fields(repository = %self.id, location = %self.location))]
    pub async fn commit(mut self) -> Result<CommitSummary> {
        if !self.transactional {
            exn::bail!(ErrorKind::NonTransactional);
        }
        if !self.mode.is_writable() {
            exn::bail!(ErrorKind::ReadOnlyViolation(PathBuf::from(self.id.as_str())));
        }
        let Some(overlay) = self.overlay.take() else {
            unreachable!("transactional write handle for {} has no overlay", self.id);
        };

        let committed = overlay.backend.commit().await.map_err(storage);
        let released = overlay.temporary.close().map_err(ErrorKind::Io);
        match (committed, released) {
            (Ok(summary), Ok(())) => Ok(summary),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), released) => {
                if let Err(release) = released {
                    tracing::warn!(error = %release, "Failed to release temporary directory after failed commit");
                }
                Err(err)
            },
        }
    }

    /// Release the temporary directory, discarding anything staged in it.
    pub fn close(mut self) -> Result<()> {
        let Some(overlay) = self.overlay.take() else {
            return Ok(());
        };
        tracing::debug!(repository = %self.id, "Discarding transaction");
        overlay.temporary.close().map_err(ErrorKind::Io)?;
        Ok(())
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("mode", &self.mode)
            .field("temporary", &self.temporary_path())
            .finish_non_exhaustive()
    }
}
