//! Libraries: named collections of locations.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use stacks_config::{Config, LibraryConfig};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::id::{LibraryId, LocationId, RepositoryId};
use crate::location::{LocationHandle, LocationOptions, PlainLocation, RepositoryStream};
use crate::mode::Mode;
use crate::registry::Registry;
use crate::repository::Repository;

pub type LibraryHandle = Arc<dyn Library>;
pub type LocationIter = Box<dyn Iterator<Item = LocationHandle> + Send>;

/// Where a repository was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placement {
    pub library: LibraryId,
    pub location: LocationId,
}

/// A collection of locations addressed as one repository store.
#[async_trait]
pub trait Library: fmt::Debug + Send + Sync {
    fn id(&self) -> &LibraryId;

    async fn init(&self, id: &RepositoryId) -> Result<Repository>;

    async fn get(&self, id: &RepositoryId, mode: Mode) -> Result<Repository>;

    async fn get_or_init(&self, id: &RepositoryId) -> Result<Repository>;

    /// Which location holds repository `id`, if any.
    async fn has(&self, id: &RepositoryId) -> Result<Option<Placement>>;

    /// Every repository in the library, opened in `mode`.
    fn repositories(&self, mode: Mode) -> RepositoryStream<'_>;

    /// Fails with [`ErrorKind::LocationNotExists`] for an unknown id.
    async fn location(&self, id: &LocationId) -> Result<LocationHandle>;

    async fn locations(&self) -> Result<LocationIter>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LibraryOptions {
    pub location: LocationOptions,
    /// Live locations kept by the registry. See [`Registry::new`].
    pub registry_cache: usize,
}

impl LibraryOptions {
    pub fn from_config(config: &Config, library: &LibraryConfig) -> Self {
        Self {
            location: LocationOptions::from_config(config, library),
            registry_cache: config.registry_cache(library),
        }
    }
}

/// A library of [`PlainLocation`]s.
///
/// Locations are registered up front with [`add_location`](Self::add_location)
/// and instantiated on demand through the library's [`Registry`].
pub struct PlainLibrary {
    id: LibraryId,
    locations: Vec<(LocationId, PathBuf)>,
    options: LibraryOptions,
    registry: Registry,
}

impl PlainLibrary {
    pub fn new(id: impl Into<LibraryId>, options: LibraryOptions) -> Self {
        let registry = Registry::new(options.registry_cache, options.location.transactional);
        Self {
            id: id.into(),
            locations: Vec::new(),
            options,
            registry,
        }
    }

    /// Build a library from its configuration, registering every configured
    /// location.
    pub fn from_config(id: impl Into<LibraryId>, config: &Config, library: &LibraryConfig) -> Result<Self> {
        let mut plain = Self::new(id, LibraryOptions::from_config(config, library));
        for (location, root) in &library.locations {
            plain.add_location(location.as_str(), root.clone())?;
        }
        Ok(plain)
    }

    /// Register a location. New repositories are created in the first
    /// location registered.
    pub fn add_location(&mut self, id: impl Into<LocationId>, root: impl Into<PathBuf>) -> Result<()> {
        let id = id.into();
        if self.locations.iter().any(|(existing, _)| *existing == id) {
            exn::bail!(ErrorKind::LocationExists(id));
        }
        self.locations.push((id, root.into()));
        Ok(())
    }

    pub fn options(&self) -> &LibraryOptions {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn lookup(&self, id: &LocationId) -> Result<LocationHandle> {
        let Some((_, root)) = self.locations.iter().find(|(candidate, _)| candidate == id) else {
            exn::bail!(ErrorKind::LocationNotExists(id.clone()));
        };
        self.registry.lookup_or_create(id, || {
            let location = PlainLocation::new(id.clone(), root, self.options.location.clone())?;
            Ok(Arc::new(location) as LocationHandle)
        })
    }
}

#[async_trait]
impl Library for PlainLibrary {
    fn id(&self) -> &LibraryId {
        &self.id
    }

    #[instrument(skip_all, fields(library = %self.id, repository = %id))]
    async fn init(&self, id: &RepositoryId) -> Result<Repository> {
        if let Some(placement) = self.has(id).await? {
            tracing::debug!(location = %placement.location, "Repository already exists");
            exn::bail!(ErrorKind::RepositoryExists(id.clone()));
        }
        let Some((location, _)) = self.locations.first() else {
            exn::bail!(ErrorKind::NoLocations(self.id.clone()));
        };
        self.lookup(location)?.init(id).await
    }

    async fn get(&self, id: &RepositoryId, mode: Mode) -> Result<Repository> {
        match self.has(id).await? {
            Some(placement) => self.lookup(&placement.location)?.get(id, mode).await,
            None => exn::bail!(ErrorKind::RepositoryNotExists(id.clone())),
        }
    }

    async fn get_or_init(&self, id: &RepositoryId) -> Result<Repository> {
        match self.get(id, Mode::ReadWrite).await {
            Err(err) if matches!(&*err, ErrorKind::RepositoryNotExists(_)) => self.init(id).await,
            other => other,
        }
    }

    async fn has(&self, id: &RepositoryId) -> Result<Option<Placement>> {
        for (location, _) in &self.locations {
            if self.lookup(location)?.has(id).await? {
                return Ok(Some(Placement {
                    library: self.id.clone(),
                    location: location.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn repositories(&self, mode: Mode) -> RepositoryStream<'_> {
        Box::pin(stream! {
            for (id, _) in &self.locations {
                let location = match self.lookup(id) {
                    Ok(location) => location,
                    Err(err) => {
                        yield Err(err);
                        continue;
                    },
                };
                let mut repositories = location.repositories(mode);
                while let Some(repository) = repositories.next().await {
                    yield repository;
                }
            }
        })
    }

    async fn location(&self, id: &LocationId) -> Result<LocationHandle> {
        self.lookup(id)
    }

    async fn locations(&self) -> Result<LocationIter> {
        let locations = self.locations.iter().map(|(id, _)| self.lookup(id)).collect::<Result<Vec<_>>>()?;
        Ok(Box::new(locations.into_iter()))
    }
}

impl fmt::Debug for PlainLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainLibrary")
            .field("id", &self.id)
            .field("locations", &self.locations)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    fn library(dir: &TempDir, locations: &[&str]) -> PlainLibrary {
        let options = LibraryOptions {
            location: LocationOptions {
                transactional: false,
                temporary_root: dir.path().join("transactions"),
                object_cache: 16,
            },
            registry_cache: 8,
        };
        let mut library = PlainLibrary::new("test", options);
        for location in locations {
            library.add_location(*location, dir.path().join(location)).unwrap();
        }
        library
    }

    fn id(name: &str) -> RepositoryId {
        RepositoryId::from_endpoint(&format!("git@github.com:foo/{name}")).unwrap()
    }

    #[test]
    fn test_duplicate_location() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = library(&dir, &["a"]);
        let err = library.add_location("a", dir.path().join("elsewhere")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::LocationExists(_)));
    }

    #[tokio::test]
    async fn test_init_without_locations() {
        let dir = tempfile::tempdir().unwrap();
        let err = library(&dir, &[]).init(&id("bar")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NoLocations(_)));
    }

    #[tokio::test]
    async fn test_resolves_across_locations() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, &["a", "b"]);
        // Plant a repository directly in the second location.
        library.location(&LocationId::from("b")).await.unwrap().init(&id("planted")).await.unwrap();
        library.init(&id("fresh")).await.unwrap();

        let placement = library.has(&id("planted")).await.unwrap().unwrap();
        assert_eq!(placement, Placement { library: LibraryId::from("test"), location: LocationId::from("b") });
        let placement = library.has(&id("fresh")).await.unwrap().unwrap();
        assert_eq!(placement.location, LocationId::from("a"));
        assert_eq!(library.has(&id("missing")).await.unwrap(), None);

        let repository = library.get(&id("planted"), Mode::ReadOnly).await.unwrap();
        assert_eq!(repository.location_id(), &LocationId::from("b"));
        let err = library.get(&id("missing"), Mode::ReadOnly).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RepositoryNotExists(_)));
        let err = library.init(&id("planted")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RepositoryExists(_)));
    }

    #[tokio::test]
    async fn test_get_or_init() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, &["a"]);
        let repository = library.get_or_init(&id("bar")).await.unwrap();
        assert_eq!(repository.mode(), Mode::ReadWrite);
        assert!(library.has(&id("bar")).await.unwrap().is_some());
        library.get_or_init(&id("bar")).await.unwrap();
    }

    #[tokio::test]
    async fn test_locations_in_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, &["q", "p"]);
        let ids: Vec<_> = library.locations().await.unwrap().map(|location| location.id().clone()).collect();
        assert_eq!(ids, vec![LocationId::from("q"), LocationId::from("p")]);
        let err = library.location(&LocationId::from("r")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LocationNotExists(_)));
    }

    #[tokio::test]
    async fn test_repositories_across_locations() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(&dir, &["a", "b"]);
        library.init(&id("one")).await.unwrap();
        library.location(&LocationId::from("b")).await.unwrap().init(&id("two")).await.unwrap();
        let repositories: Vec<_> = library.repositories(Mode::ReadOnly).try_collect().await.unwrap();
        let placed: Vec<_> = repositories.iter().map(|r| (r.location_id().as_str(), r.id().as_str())).collect();
        assert_eq!(placed, vec![("a", "github.com/foo/one.git"), ("b", "github.com/foo/two.git")]);
    }
}
