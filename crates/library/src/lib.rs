//! Repository storage organised into locations and libraries.
//!
//! - A [`Location`] is one storage root holding many repositories.
//! - A [`Library`] is a named collection of locations, with a [`Registry`]
//!   making sure each location has at most one live instance.
//! - [`Libraries`] aggregates any number of libraries behind the same
//!   [`Library`] interface.
//!
//! In a transactional deployment every write session is staged in a
//! temporary directory and only reaches permanent storage when the
//! [`Repository`] handle is committed.

mod cache;
pub mod error;
mod id;
mod libraries;
mod library;
mod location;
mod mode;
mod object;
mod registry;
mod repository;
mod storer;

pub use crate::cache::{OBJECT_CACHE_SIZE, ObjectCache};
pub use crate::id::{LibraryId, LocationId, RepositoryId};
pub use crate::libraries::{Libraries, Options, RepositoryOrder, round_robin, sequential};
pub use crate::library::{Library, LibraryHandle, LibraryOptions, LocationIter, Placement, PlainLibrary};
pub use crate::location::{DEFAULT_REMOTE, Location, LocationHandle, LocationOptions, PlainLocation, RepositoryStream};
pub use crate::mode::Mode;
pub use crate::object::{ObjectId, ObjectStore, Remote};
pub use crate::registry::{REGISTRY_CACHE_SIZE, Registry};
pub use crate::repository::Repository;
pub use stacks_storage::backend::CommitSummary;
