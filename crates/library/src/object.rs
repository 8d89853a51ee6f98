//! Content-addressed repository object store.
//!
//! A repository is a directory holding a JSON `config` (its remotes), one
//! file per reference under `refs/`, and BLAKE3-addressed objects under
//! `objects/`, fanned out by the first byte of their id:
//!
//! ```text
//! config
//! refs/main                 -> hex object id
//! objects/4f/1a09…          -> object bytes
//! ```
//!
//! The store only ever sees a [`BackendHandle`], so the same code reads and
//! writes plain, read-only and transactional repositories.

use derive_more::Display;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use stacks_storage::BackendHandle;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

use crate::cache::ObjectCache;
use crate::error::{ErrorKind, Result, storage};
use crate::id::RepositoryId;

const CONFIG: &str = "config";
const REFS: &str = "refs";
const OBJECTS: &str = "objects";

/// BLAKE3 digest of an object's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{}", blake3::Hash::from_bytes(*_0).to_hex())]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex.trim()).ok().map(|hash| Self(*hash.as_bytes()))
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    fn path(&self) -> PathBuf {
        let hex = self.to_hex();
        Path::new(OBJECTS).join(&hex[..2]).join(&hex[2..])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub urls: Vec<String>,
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            urls: vec![url.into()],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryConfig {
    #[serde(default)]
    remotes: Vec<Remote>,
}

/// The storage engine behind a repository handle.
pub struct ObjectStore {
    id: RepositoryId,
    backend: BackendHandle,
    cache: Arc<ObjectCache>,
}

impl ObjectStore {
    /// Create an empty repository in `backend`.
    pub(crate) async fn init(id: RepositoryId, backend: BackendHandle, cache: Arc<ObjectCache>) -> Result<Self> {
        let store = Self { id, backend, cache };
        store.write_config(&RepositoryConfig::default()).await?;
        Ok(store)
    }

    /// Open the repository in `backend`, checking that its configuration is
    /// readable.
    pub(crate) async fn open(id: RepositoryId, backend: BackendHandle, cache: Arc<ObjectCache>) -> Result<Self> {
        let store = Self { id, backend, cache };
        store.read_config().await?;
        Ok(store)
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    /// The raw storage this repository reads and writes.
    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    async fn read_config(&self) -> Result<RepositoryConfig> {
        let data = match self.backend.read(Path::new(CONFIG)).await {
            Ok(data) => data,
            Err(err) if err.is_not_found() => exn::bail!(ErrorKind::RepositoryNotExists(self.id.clone())),
            Err(err) => return Err(storage(err)),
        };
        serde_json::from_slice(&data)
            .or_raise(|| ErrorKind::Corrupt(format!("unreadable config for repository {}", self.id)))
    }

    async fn write_config(&self, config: &RepositoryConfig) -> Result<()> {
        let data = serde_json::to_vec_pretty(config)
            .or_raise(|| ErrorKind::Corrupt(format!("unserializable config for repository {}", self.id)))?;
        self.backend.write(Path::new(CONFIG), &data).await.map_err(storage)
    }

    pub async fn remotes(&self) -> Result<Vec<Remote>> {
        Ok(self.read_config().await?.remotes)
    }

    pub async fn remote(&self, name: &str) -> Result<Option<Remote>> {
        Ok(self.read_config().await?.remotes.into_iter().find(|remote| remote.name == name))
    }

    /// Add a remote, replacing any existing remote with the same name.
    pub async fn set_remote(&self, remote: Remote) -> Result<()> {
        let mut config = self.read_config().await?;
        match config.remotes.iter_mut().find(|existing| existing.name == remote.name) {
            Some(existing) => *existing = remote,
            None => config.remotes.push(remote),
        }
        self.write_config(&config).await
    }

    /// Remove a remote. Returns `false` if there was none by that name.
    pub async fn delete_remote(&self, name: &str) -> Result<bool> {
        let mut config = self.read_config().await?;
        let before = config.remotes.len();
        config.remotes.retain(|remote| remote.name != name);
        if config.remotes.len() == before {
            return Ok(false);
        }
        self.write_config(&config).await?;
        Ok(true)
    }

    /// Store an object, returning its id. Storing an object that already
    /// exists is a no-op.
    #[instrument(skip(self, data), fields(repository = %self.id, size = data.len()))]
    pub async fn write_object(&self, data: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::hash(data);
        let path = id.path();
        if !self.backend.exists(&path).await.map_err(storage)? {
            self.backend.write(&path, data).await.map_err(storage)?;
            tracing::trace!(object = %id, "Stored object");
        }
        self.cache.put(&self.id, id, Arc::from(data));
        Ok(id)
    }

    /// Fetch an object, or `None` if the repository doesn't have it.
    pub async fn object(&self, id: &ObjectId) -> Result<Option<Arc<[u8]>>> {
        if let Some(data) = self.cache.get(&self.id, id) {
            return Ok(Some(data));
        }
        let data: Arc<[u8]> = match self.backend.read(&id.path()).await {
            Ok(data) => Arc::from(data),
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(storage(err)),
        };
        if ObjectId::hash(&data) != *id {
            exn::bail!(ErrorKind::Corrupt(format!("object {id} in repository {} fails verification", self.id)));
        }
        self.cache.put(&self.id, *id, data.clone());
        Ok(Some(data))
    }

    pub async fn has_object(&self, id: &ObjectId) -> Result<bool> {
        self.backend.exists(&id.path()).await.map_err(storage)
    }

    /// Ids of every stored object, in storage order.
    pub async fn objects(&self) -> Result<Vec<ObjectId>> {
        let files = self.backend.list(Some(Path::new(OBJECTS))).await.map_err(storage)?;
        files
            .into_iter()
            .map(|file| {
                let hex: String = file
                    .path
                    .strip_prefix(OBJECTS)
                    .unwrap_or(&file.path)
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect();
                ObjectId::from_hex(&hex).ok_or_else(|| {
                    exn::Exn::from(ErrorKind::Corrupt(format!("stray file {} in object storage", file.path.display())))
                })
            })
            .collect()
    }

    /// Point reference `name` at an object.
    pub async fn set_reference(&self, name: &str, target: ObjectId) -> Result<()> {
        let path = Path::new(REFS).join(name);
        self.backend.write(&path, target.to_hex().as_bytes()).await.map_err(storage)?;
        tracing::debug!(repository = %self.id, reference = name, target = %target, "Updated reference");
        Ok(())
    }

    pub async fn reference(&self, name: &str) -> Result<Option<ObjectId>> {
        let path = Path::new(REFS).join(name);
        match self.backend.read(&path).await {
            Ok(data) => parse_reference(name, &data).map(Some),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(storage(err)),
        }
    }

    /// Every reference, keyed by name relative to `refs/`.
    pub async fn references(&self) -> Result<BTreeMap<String, ObjectId>> {
        let files = self.backend.list(Some(Path::new(REFS))).await.map_err(storage)?;
        let mut references = BTreeMap::new();
        for file in files {
            let name = file.path.strip_prefix(REFS).unwrap_or(&file.path).to_string_lossy().into_owned();
            let data = self.backend.read(&file.path).await.map_err(storage)?;
            references.insert(name.clone(), parse_reference(&name, &data)?);
        }
        Ok(references)
    }

    /// Remove a reference. Returns `false` if it didn't exist.
    pub async fn delete_reference(&self, name: &str) -> Result<bool> {
        match self.backend.delete(&Path::new(REFS).join(name)).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(storage(err)),
        }
    }
}

fn parse_reference(name: &str, data: &[u8]) -> Result<ObjectId> {
    std::str::from_utf8(data)
        .ok()
        .and_then(ObjectId::from_hex)
        .ok_or_else(|| exn::Exn::from(ErrorKind::Corrupt(format!("reference {name} is not an object id"))))
}
