//! Locations: storage roots holding repositories.

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use stacks_config::{Config, LibraryConfig};
use stacks_storage::StorageBackend;
use stacks_storage::backend::LocalBackend;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tracing::instrument;

use crate::cache::{OBJECT_CACHE_SIZE, ObjectCache};
use crate::error::{ErrorKind, Result, storage};
use crate::id::{LocationId, RepositoryId};
use crate::mode::Mode;
use crate::object::{ObjectStore, Remote};
use crate::repository::Repository;
use crate::storer::{self, StorerOptions};

pub type RepositoryStream<'a> = Pin<Box<dyn Stream<Item = Result<Repository>> + Send + 'a>>;
pub type LocationHandle = Arc<dyn Location>;

/// Name of the remote every new repository gets, pointing at its id.
pub const DEFAULT_REMOTE: &str = "origin";
const REPOSITORY_CONFIG: &str = "config";
const REPOSITORY_SUFFIX: &str = ".git";

/// A storage root that repositories are created in and opened from.
#[async_trait]
pub trait Location: fmt::Debug + Send + Sync {
    fn id(&self) -> &LocationId;

    /// Create a repository. Fails with [`ErrorKind::RepositoryExists`] if it's
    /// already there.
    async fn init(&self, id: &RepositoryId) -> Result<Repository>;

    /// Open an existing repository. Fails with
    /// [`ErrorKind::RepositoryNotExists`] if it isn't there, or
    /// [`ErrorKind::ModeNotSupported`] if the deployment can't honour `mode`.
    async fn get(&self, id: &RepositoryId, mode: Mode) -> Result<Repository>;

    /// Open a repository read-write, creating it first if necessary.
    async fn get_or_init(&self, id: &RepositoryId) -> Result<Repository> {
        match self.get(id, Mode::ReadWrite).await {
            Err(err) if matches!(&*err, ErrorKind::RepositoryNotExists(_)) => self.init(id).await,
            other => other,
        }
    }

    async fn has(&self, id: &RepositoryId) -> Result<bool>;

    /// Every repository in the location, opened in `mode`.
    ///
    /// The stream is lazy: each repository is opened only when it's reached.
    /// Calling this again starts a fresh pass.
    fn repositories(&self, mode: Mode) -> RepositoryStream<'_>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationOptions {
    pub transactional: bool,
    pub temporary_root: PathBuf,
    /// Capacity of the object cache shared by non-transactional handles.
    pub object_cache: usize,
}

impl LocationOptions {
    pub fn from_config(config: &Config, library: &LibraryConfig) -> Self {
        Self {
            transactional: config.is_transactional(library),
            temporary_root: config.temporary_root.clone(),
            object_cache: config.object_cache,
        }
    }
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            transactional: false,
            temporary_root: Config::default().temporary_root,
            object_cache: OBJECT_CACHE_SIZE,
        }
    }
}

/// A location backed by a plain directory, one subdirectory per repository.
pub struct PlainLocation {
    id: LocationId,
    backend: LocalBackend,
    options: LocationOptions,
    cache: Arc<ObjectCache>,
}

impl PlainLocation {
    /// Open the location rooted at `root`, creating the directory if needed.
    pub fn new(id: LocationId, root: impl AsRef<Path>, options: LocationOptions) -> Result<Self> {
        let backend = LocalBackend::new(id.as_str(), root).map_err(storage)?;
        let cache = Arc::new(ObjectCache::new(options.object_cache));
        tracing::debug!(location = %id, root = %backend.root().display(), "Opened location");
        Ok(Self {
            id,
            backend,
            options,
            cache,
        })
    }

    pub fn path(&self) -> &Path {
        self.backend.root()
    }

    pub fn options(&self) -> &LocationOptions {
        &self.options
    }

    /// Object cache shared by this location's non-transactional handles.
    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    async fn open(&self, id: &RepositoryId, mode: Mode, init: bool) -> Result<Repository> {
        let options = StorerOptions {
            transactional: self.options.transactional,
            temporary_root: &self.options.temporary_root,
        };
        let storer = storer::build(self.path(), id, mode, &options)?;
        // Writes staged in an overlay may be discarded, so they must never
        // reach a cache other handles read from.
        let cache = match storer.overlay {
            Some(_) => Arc::new(ObjectCache::new(self.options.object_cache)),
            None => self.cache.clone(),
        };
        let store = if init {
            let store = ObjectStore::init(id.clone(), storer.backend, cache).await?;
            store.set_remote(Remote::new(DEFAULT_REMOTE, id.as_str())).await?;
            store
        } else {
            ObjectStore::open(id.clone(), storer.backend, cache).await?
        };
        Ok(Repository::new(
            id.clone(),
            self.id.clone(),
            mode,
            self.options.transactional,
            store,
            storer.overlay,
        ))
    }
}

#[async_trait]
impl Location for PlainLocation {
    fn id(&self) -> &LocationId {
        &self.id
    }

    #[instrument(skip_all, fields(location = %self.id, repository = %id))]
    async fn init(&self, id: &RepositoryId) -> Result<Repository> {
        if self.has(id).await? {
            exn::bail!(ErrorKind::RepositoryExists(id.clone()));
        }
        let repository = self.open(id, Mode::ReadWrite, true).await?;
        tracing::info!(staged = repository.temporary_path().is_some(), "Initialized repository");
        Ok(repository)
    }

    #[instrument(skip_all, fields(location = %self.id, repository = %id))]
    async fn get(&self, id: &RepositoryId, mode: Mode) -> Result<Repository> {
        if !self.has(id).await? {
            exn::bail!(ErrorKind::RepositoryNotExists(id.clone()));
        }
        self.open(id, mode, false).await
    }

    async fn has(&self, id: &RepositoryId) -> Result<bool> {
        let config = id.relative_path().join(REPOSITORY_CONFIG);
        self.backend.exists(&config).await.map_err(storage)
    }

    fn repositories(&self, mode: Mode) -> RepositoryStream<'_> {
        Box::pin(stream! {
            let mut files = self.backend.list_stream(None);
            while let Some(file) = files.next().await {
                let file = match file {
                    Ok(file) => file,
                    Err(err) => {
                        yield Err(storage(err));
                        continue;
                    },
                };
                if file.file_name() != Some(REPOSITORY_CONFIG) {
                    continue;
                }
                let Some(repository) = repository_root(&file.path) else {
                    continue;
                };
                yield self.open(&RepositoryId::verbatim(repository), mode, false).await;
            }
        })
    }
}

/// The repository a `config` file belongs to, if it sits directly inside the
/// first `.git` directory on its path. Anything deeper is repository content.
fn repository_root(config: &Path) -> Option<&str> {
    let parent = config.parent()?;
    let first = parent
        .ancestors()
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .filter_map(Path::to_str)
        .filter(|ancestor| ancestor.ends_with(REPOSITORY_SUFFIX))
        .last()?;
    (first == parent.to_str()?).then_some(first)
}

impl fmt::Debug for PlainLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainLocation")
            .field("id", &self.id)
            .field("root", &self.path())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
