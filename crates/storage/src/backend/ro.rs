//! Read-only storage backend.
//!
//! Wraps another backend, passing reads through and refusing every write
//! operation with [`ErrorKind::ReadOnly`].

use async_trait::async_trait;
use std::path::Path;

use crate::error::ErrorKind;
use crate::{BackendHandle, StorageBackend, backend::FileInfoStream, error::Result, file::FileInfo};

/// Read-only storage backend.
///
/// Repositories opened in read-only mode get their storage wrapped in this,
/// so a mutation can never reach the underlying store no matter which code
/// path attempts it.
#[derive(Clone)]
pub struct ReadOnlyBackend {
    inner: BackendHandle,
}
impl ReadOnlyBackend {
    pub fn new(inner: BackendHandle) -> Self {
        Self { inner }
    }

    fn refuse(&self, path: &Path, operation: &'static str) -> Result<()> {
        tracing::warn!(backend = self.inner.name(), path = %path.display(), operation, "Refusing write to read-only storage");
        exn::bail!(ErrorKind::ReadOnly(path.to_path_buf()))
    }
}

#[async_trait]
impl StorageBackend for ReadOnlyBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        self.inner.list_stream(prefix)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        self.inner.read_head(path, bytes).await
    }

    async fn write(&self, path: &Path, _data: &[u8]) -> Result<()> {
        self.refuse(path, "write")
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.refuse(path, "delete")
    }

    async fn rename(&self, from: &Path, _to: &Path) -> Result<()> {
        self.refuse(from, "rename")
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        self.inner.stat(path).await
    }
}
