//! Aggregation of many libraries behind a single [`Library`].
//!
//! Lookups probe member libraries one after another under one shared
//! deadline. The deadline is checked before each probe; a probe already in
//! flight when it passes is allowed to finish, but no further probe starts.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use stacks_config::{Config, DEFAULT_TIMEOUT};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{ErrorKind, Result};
use crate::id::{LibraryId, LocationId, RepositoryId};
use crate::library::{Library, LibraryHandle, LocationIter, Placement, PlainLibrary};
use crate::location::{LocationHandle, RepositoryStream};
use crate::mode::Mode;
use crate::repository::Repository;

/// Decides the order [`Libraries::repositories`] visits member libraries in.
pub type RepositoryOrder = for<'a> fn(&'a Libraries, Mode) -> RepositoryStream<'a>;

pub struct Options {
    /// Budget shared by all probes of one aggregated operation. Zero selects
    /// the default of 60 seconds.
    pub timeout: Duration,
    pub repository_order: RepositoryOrder,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            repository_order: sequential,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

struct Deadline(Instant);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    fn check(&self) -> Result<()> {
        if Instant::now() >= self.0 {
            exn::bail!(ErrorKind::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Many libraries presented as one.
///
/// Members are kept in identifier order, which is the order they're probed
/// in. Members shouldn't themselves be aggregates.
#[derive(Debug)]
pub struct Libraries {
    id: LibraryId,
    libraries: BTreeMap<LibraryId, LibraryHandle>,
    options: Options,
}

impl Libraries {
    pub fn new(mut options: Options) -> Self {
        if options.timeout.is_zero() {
            options.timeout = DEFAULT_TIMEOUT;
        }
        Self {
            id: LibraryId::default(),
            libraries: BTreeMap::new(),
            options,
        }
    }

    /// Build an aggregator with one [`PlainLibrary`] per configured library.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut libraries = Self::new(Options {
            timeout: config.timeout(),
            ..Options::default()
        });
        for (id, library) in &config.libraries {
            libraries.add(Arc::new(PlainLibrary::from_config(id.as_str(), config, library)?))?;
        }
        tracing::info!(libraries = libraries.libraries.len(), "Loaded libraries from configuration");
        Ok(libraries)
    }

    pub fn timeout(&self) -> Duration {
        self.options.timeout
    }

    /// Register a library. Fails with [`ErrorKind::LibraryExists`] if one
    /// with the same id is already registered, keeping the existing one.
    pub fn add(&mut self, library: LibraryHandle) -> Result<()> {
        let id = library.id().clone();
        if self.libraries.contains_key(&id) {
            exn::bail!(ErrorKind::LibraryExists(id));
        }
        self.libraries.insert(id, library);
        Ok(())
    }

    /// Direct lookup of a member library.
    pub fn library(&self, id: &LibraryId) -> Result<LibraryHandle> {
        self.libraries
            .get(id)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::LibraryNotExists(id.clone())))
    }

    pub fn libraries(&self) -> Result<std::vec::IntoIter<LibraryHandle>> {
        self.filtered_libraries(|_| Ok(true))
    }

    /// Members for which `filter` returns `true`. Fails on the first error
    /// `filter` returns, or if the deadline passes.
    pub fn filtered_libraries<F>(&self, mut filter: F) -> Result<std::vec::IntoIter<LibraryHandle>>
    where
        F: FnMut(&LibraryHandle) -> Result<bool>,
    {
        let deadline = Deadline::after(self.options.timeout);
        let mut selected = Vec::with_capacity(self.libraries.len());
        for library in self.libraries.values() {
            deadline.check()?;
            if filter(library)? {
                selected.push(library.clone());
            }
        }
        Ok(selected.into_iter())
    }
}

#[async_trait]
impl Library for Libraries {
    /// Aggregates have no identity of their own.
    fn id(&self) -> &LibraryId {
        &self.id
    }

    async fn init(&self, _id: &RepositoryId) -> Result<Repository> {
        exn::bail!(ErrorKind::NotImplemented("init on aggregated libraries"))
    }

    async fn get(&self, id: &RepositoryId, mode: Mode) -> Result<Repository> {
        let deadline = Deadline::after(self.options.timeout);
        for library in self.libraries.values() {
            deadline.check()?;
            match library.get(id, mode).await {
                Err(err) if err.is_miss() => continue,
                result => return result,
            }
        }
        exn::bail!(ErrorKind::RepositoryNotExists(id.clone()))
    }

    async fn get_or_init(&self, _id: &RepositoryId) -> Result<Repository> {
        exn::bail!(ErrorKind::NotImplemented("get_or_init on aggregated libraries"))
    }

    async fn has(&self, id: &RepositoryId) -> Result<Option<Placement>> {
        let deadline = Deadline::after(self.options.timeout);
        for library in self.libraries.values() {
            deadline.check()?;
            match library.has(id).await {
                Ok(Some(placement)) => return Ok(Some(placement)),
                Ok(None) => {},
                Err(err) if err.is_miss() => {},
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn repositories(&self, mode: Mode) -> RepositoryStream<'_> {
        (self.options.repository_order)(self, mode)
    }

    async fn location(&self, id: &LocationId) -> Result<LocationHandle> {
        let deadline = Deadline::after(self.options.timeout);
        for library in self.libraries.values() {
            deadline.check()?;
            match library.location(id).await {
                Err(err) if err.is_miss() => continue,
                result => return result,
            }
        }
        exn::bail!(ErrorKind::LocationNotExists(id.clone()))
    }

    async fn locations(&self) -> Result<LocationIter> {
        let deadline = Deadline::after(self.options.timeout);
        let mut merged: Vec<LocationIter> = Vec::with_capacity(self.libraries.len());
        for library in self.libraries.values() {
            deadline.check()?;
            merged.push(library.locations().await?);
        }
        Ok(Box::new(merged.into_iter().flatten()))
    }
}

/// Exhaust each library's repositories before moving on to the next.
pub fn sequential(libraries: &Libraries, mode: Mode) -> RepositoryStream<'_> {
    Box::pin(stream! {
        for library in libraries.libraries.values() {
            let mut repositories = library.repositories(mode);
            while let Some(repository) = repositories.next().await {
                yield repository;
            }
        }
    })
}

/// Take one repository from each library in turn, dropping libraries as they
/// run out.
pub fn round_robin(libraries: &Libraries, mode: Mode) -> RepositoryStream<'_> {
    Box::pin(stream! {
        let mut streams: Vec<RepositoryStream<'_>> =
            libraries.libraries.values().map(|library| library.repositories(mode)).collect();
        while !streams.is_empty() {
            let mut index = 0;
            while index < streams.len() {
                match streams[index].next().await {
                    Some(repository) => {
                        yield repository;
                        index += 1;
                    },
                    None => {
                        streams.remove(index);
                    },
                }
            }
        }
    })
}
