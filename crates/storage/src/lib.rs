//! Storage backends for stacks.
//!
//! Everything above this crate (repositories, locations, libraries) talks to
//! storage exclusively through [`StorageBackend`]. The interesting backends
//! are the decorators: [`ReadOnlyBackend`](backend::ReadOnlyBackend) refuses
//! mutation, and [`TransactionalBackend`](backend::TransactionalBackend)
//! stages every write in a temporary backend until it is committed.

pub mod backend;
pub mod error;
pub mod file;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::file::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
