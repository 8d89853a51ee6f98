//! Transactional overlay backend.
//!
//! Composes a permanent backend with a temporary one. Reads fall through to
//! the permanent backend for anything the session hasn't touched, while every
//! write lands in the temporary backend only. Deleting a permanent file
//! records a tombstone instead of touching it. Nothing reaches the permanent
//! backend until [`commit`](TransactionalBackend::commit), and dropping the
//! overlay without committing discards everything.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use crate::{BackendHandle, StorageBackend, backend::FileInfoStream, file::FileInfo};

/// What a successful commit applied to the permanent backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Files copied from the temporary backend.
    pub written: usize,
    /// Files removed because the session deleted them.
    pub deleted: usize,
}

/// How to put one permanent path back the way it was before a commit touched it.
enum Undo {
    Restore(PathBuf, Vec<u8>),
    Remove(PathBuf),
}

/// Overlay of a temporary backend on top of a permanent one.
pub struct TransactionalBackend {
    permanent: BackendHandle,
    temporary: BackendHandle,
    /// Permanent paths deleted during this session.
    tombstones: Mutex<BTreeSet<PathBuf>>,
}

impl TransactionalBackend {
    pub fn new(permanent: BackendHandle, temporary: BackendHandle) -> Self {
        Self {
            permanent,
            temporary,
            tombstones: Mutex::new(BTreeSet::new()),
        }
    }

    /// Merge everything staged in the temporary backend into the permanent one.
    ///
    /// All-or-nothing: each permanent file about to be overwritten or deleted
    /// is read first, and if any step fails every change already applied is
    /// reverted before the error is returned. On success the staging area is
    /// emptied, so a second commit without new writes fails with
    /// [`ErrorKind::EmptyCommit`].
    #[instrument(skip(self), fields(backend = self.permanent.name()))]
    pub async fn commit(&self) -> Result<CommitSummary> {
        // Held for the whole commit so that no write can slip in between
        // snapshotting the staging area and clearing it.
        let mut tombstones = self.tombstones.lock().await;
        let staged = self.temporary.list(None).await?;
        if staged.is_empty() && tombstones.is_empty() {
            exn::bail!(ErrorKind::EmptyCommit);
        }

        let mut undo = Vec::with_capacity(staged.len() + tombstones.len());
        if let Err(err) = self.apply(&staged, &tombstones, &mut undo).await {
            tracing::warn!(error = %*err, changes = undo.len(), "Commit failed; reverting permanent storage");
            self.revert(undo).await;
            return Err(err);
        }

        let summary = CommitSummary {
            written: staged.len(),
            deleted: tombstones.len(),
        };
        tombstones.clear();
        for file in staged {
            // The permanent backend is already up to date at this point, so a
            // leftover staged file is harmless; it's rewritten identically by
            // a later commit or discarded with the temporary directory.
            if let Err(err) = self.temporary.delete(&file.path).await {
                tracing::debug!(path = %file.path.display(), error = %*err, "Could not clear staged file after commit");
            }
        }
        tracing::info!(written = summary.written, deleted = summary.deleted, "Committed transaction");
        Ok(summary)
    }

    async fn apply(&self, staged: &[FileInfo], tombstones: &BTreeSet<PathBuf>, undo: &mut Vec<Undo>) -> Result<()> {
        for file in staged {
            let data = self.temporary.read(&file.path).await?;
            let previous = self.read_permanent(&file.path).await?;
            // Recorded before writing: a write that fails half-way still has
            // to be reverted.
            undo.push(match previous {
                Some(previous) => Undo::Restore(file.path.clone(), previous),
                None => Undo::Remove(file.path.clone()),
            });
            self.permanent.write(&file.path, &data).await?;
        }
        for path in tombstones {
            let Some(previous) = self.read_permanent(path).await? else {
                continue;
            };
            undo.push(Undo::Restore(path.clone(), previous));
            self.permanent.delete(path).await?;
        }
        Ok(())
    }

    async fn revert(&self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let (path, result) = match step {
                Undo::Restore(path, data) => {
                    let result = self.permanent.write(&path, &data).await;
                    (path, result)
                },
                Undo::Remove(path) => {
                    let result = match self.permanent.delete(&path).await {
                        Err(err) if err.is_not_found() => Ok(()),
                        other => other,
                    };
                    (path, result)
                },
            };
            if let Err(err) = result {
                tracing::error!(path = %path.display(), error = %*err, "Failed to revert file after aborted commit");
            }
        }
    }

    async fn read_permanent(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match self.permanent.read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Which backend currently holds `path`, if any.
    async fn resolve(&self, path: &Path) -> Result<Option<&BackendHandle>> {
        let path = validate_path(path)?;
        if self.temporary.exists(&path).await? {
            return Ok(Some(&self.temporary));
        }
        if self.tombstones.lock().await.contains(&path) {
            return Ok(None);
        }
        if self.permanent.exists(&path).await? {
            return Ok(Some(&self.permanent));
        }
        Ok(None)
    }

    async fn resolve_existing(&self, path: &Path) -> Result<&BackendHandle> {
        match self.resolve(path).await? {
            Some(backend) => Ok(backend),
            None => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        }
    }
}

#[async_trait]
impl StorageBackend for TransactionalBackend {
    fn name(&self) -> &str {
        self.permanent.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        Box::pin(stream! {
            let tombstones = self.tombstones.lock().await.clone();
            let mut staged = BTreeSet::new();
            let mut temporary = self.temporary.list_stream(prefix);
            while let Some(file) = temporary.next().await {
                if let Ok(file) = &file {
                    staged.insert(file.path.clone());
                }
                yield file;
            }
            let mut permanent = self.permanent.list_stream(prefix);
            while let Some(file) = permanent.next().await {
                match file {
                    Ok(file) if staged.contains(&file.path) || tombstones.contains(&file.path) => continue,
                    other => yield other,
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve(path).await?.is_some())
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.resolve_existing(path).await?.read(path).await
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        self.resolve_existing(path).await?.read_head(path, bytes).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        let mut tombstones = self.tombstones.lock().await;
        self.temporary.write(&path, data).await?;
        tombstones.remove(&path);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        let staged = self.temporary.exists(&path).await?;
        let mut tombstones = self.tombstones.lock().await;
        let permanent = !tombstones.contains(&path) && self.permanent.exists(&path).await?;
        if !staged && !permanent {
            exn::bail!(ErrorKind::NotFound(path));
        }
        if staged {
            self.temporary.delete(&path).await?;
        }
        if permanent {
            tombstones.insert(path);
        }
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self.read(from).await?;
        self.write(to, &data).await?;
        self.delete(from).await
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.resolve_existing(path).await?.stat(path).await
    }
}
