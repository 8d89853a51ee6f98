//! Configuration for stacks deployments.
//!
//! Values are layered with `figment`: built-in defaults first, then an
//! optional configuration file (TOML, YAML or JSON, picked by extension), then
//! environment variables prefixed with `STACKS_`. Nested keys in environment
//! variables are separated by a double underscore, so
//! `STACKS_LIBRARIES__MAIN__TRANSACTIONAL=true` sets
//! `libraries.main.transactional`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "STACKS_";
/// Aggregator deadline used when none (or zero) is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Objects kept in a repository's shared object cache.
pub const OBJECT_CACHE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stage every write in a temporary directory until it is committed.
    pub transactional: bool,
    /// Where transactional sessions allocate their temporary directories.
    pub temporary_root: PathBuf,
    /// Number of live locations kept per library. Zero disables caching,
    /// except in transactional deployments where it selects the default.
    pub registry_cache: usize,
    /// Number of objects kept in each location's shared object cache.
    pub object_cache: usize,
    /// Aggregator deadline in seconds; zero means the default of 60.
    pub timeout_secs: u64,
    pub libraries: BTreeMap<String, LibraryConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Location identifier to absolute storage root.
    pub locations: BTreeMap<String, PathBuf>,
    pub transactional: Option<bool>,
    pub registry_cache: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transactional: false,
            temporary_root: default_temporary_root(),
            registry_cache: 0,
            object_cache: OBJECT_CACHE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            libraries: BTreeMap::new(),
        }
    }
}

fn default_temporary_root() -> PathBuf {
    match ProjectDirs::from("", "", "stacks") {
        Some(dirs) => dirs.cache_dir().join("transactions"),
        None => std::env::temp_dir().join("stacks").join("transactions"),
    }
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::NotFound`] if `path` is given but doesn't exist.
    /// - [`ErrorKind::UnsupportedFormat`] if `path` has an unknown extension.
    /// - [`ErrorKind::Invalid`] if the merged values don't deserialize or
    ///   fail validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let figment = Self::figment(path)?.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Load configuration from defaults and a file only, ignoring the
    /// environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::extract(Self::figment(Some(path))?)
    }

    fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let Some(path) = path else {
            return Ok(figment);
        };
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
        let figment = match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::debug!(path = %path.display(), "Loading configuration file");
        Ok(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().map_err(|e| ErrorKind::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let transactional = self.transactional || self.libraries.values().any(|library| self.is_transactional(library));
        if transactional && !self.temporary_root.is_absolute() {
            exn::bail!(ErrorKind::Invalid(format!(
                "temporary root must be an absolute path: {}",
                self.temporary_root.display()
            )));
        }
        for (library, config) in &self.libraries {
            for (location, root) in &config.locations {
                if !root.is_absolute() {
                    exn::bail!(ErrorKind::Invalid(format!(
                        "location `{location}` of library `{library}` must have an absolute root: {}",
                        root.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Aggregator deadline, substituting the default for zero.
    pub fn timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        }
    }

    /// Whether `library` runs transactionally, honouring its override.
    pub fn is_transactional(&self, library: &LibraryConfig) -> bool {
        library.transactional.unwrap_or(self.transactional)
    }

    /// Registry cache capacity for `library`, honouring its override.
    pub fn registry_cache(&self, library: &LibraryConfig) -> usize {
        library.registry_cache.unwrap_or(self.registry_cache)
    }
}
