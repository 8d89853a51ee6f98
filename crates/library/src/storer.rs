//! Builds the storage a repository handle reads and writes through.

use stacks_storage::BackendHandle;
use stacks_storage::backend::{LocalBackend, ReadOnlyBackend, TransactionalBackend};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::error::{ErrorKind, Result, storage};
use crate::id::RepositoryId;
use crate::mode::Mode;

/// A transactional session's staging area.
pub(crate) struct Overlay {
    pub(crate) backend: Arc<TransactionalBackend>,
    /// Removed (recursively) when dropped or explicitly closed.
    pub(crate) temporary: TempDir,
}

pub(crate) struct Storer {
    pub(crate) backend: BackendHandle,
    pub(crate) overlay: Option<Overlay>,
}

/// Deployment-wide settings the factory needs.
pub(crate) struct StorerOptions<'a> {
    pub(crate) transactional: bool,
    pub(crate) temporary_root: &'a Path,
}

/// Pick the storage for repository `id` under `root` opened in `mode`.
///
/// - Read-only: the permanent storage behind a guard refusing mutation.
/// - Read-write: the permanent storage itself, unless the deployment is
///   transactional.
/// - Read-write in a transactional deployment, or transactional read-write:
///   an overlay staging writes in a fresh temporary directory.
pub(crate) fn build(root: &Path, id: &RepositoryId, mode: Mode, options: &StorerOptions<'_>) -> Result<Storer> {
    let permanent: BackendHandle =
        Arc::new(LocalBackend::lazy(id.as_str(), root.join(id.relative_path())).map_err(storage)?);
    match mode {
        Mode::ReadOnly => Ok(Storer {
            backend: Arc::new(ReadOnlyBackend::new(permanent)),
            overlay: None,
        }),
        Mode::ReadWrite if !options.transactional => Ok(Storer {
            backend: permanent,
            overlay: None,
        }),
        Mode::ReadWrite | Mode::TransactionalReadWrite if options.transactional => {
            temporal(id, permanent, options.temporary_root)
        },
        Mode::ReadWrite | Mode::TransactionalReadWrite => exn::bail!(ErrorKind::ModeNotSupported(mode.to_string())),
    }
}

fn temporal(id: &RepositoryId, permanent: BackendHandle, temporary_root: &Path) -> Result<Storer> {
    std::fs::create_dir_all(temporary_root).map_err(ErrorKind::Io)?;
    let temporary = tempfile::Builder::new().prefix("transaction-").tempdir_in(temporary_root).map_err(ErrorKind::Io)?;
    let staging: BackendHandle =
        Arc::new(LocalBackend::new(format!("{id} (staging)"), temporary.path()).map_err(storage)?);
    let backend = Arc::new(TransactionalBackend::new(permanent, staging));
    tracing::debug!(repository = %id, temporary = %temporary.path().display(), "Allocated transaction");
    Ok(Storer {
        backend: backend.clone(),
        overlay: Some(Overlay { backend, temporary }),
    })
}
