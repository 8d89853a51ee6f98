//! Identifiers for repositories, locations and libraries.

use derive_more::Display;
use regex::Regex;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::{Error, ErrorKind, Result};

const SUFFIX: &str = ".git";

// scheme://[user[:password]@]host[:port][/path][?query][#fragment]
static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?:(?P<user>[^@/]*)@)?(?P<host>\[[^\]]*\]|[^/:?#]*)(?::(?P<port>[^/?#]*))?(?P<path>/[^?#]*)?(?:[?#].*)?$").unwrap()
});
// [user@]host:[port/]path, where the path has at least one separator.
static SCP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<user>[^@]+)@)?(?P<host>[^:\s/]+):(?:(?P<port>[0-9]{1,5})[/:])?(?P<path>[^\\].*/[^\\].*)$").unwrap()
});

/// Canonical identifier of a repository.
///
/// Derived from an endpoint by keeping only the host and the path, and making
/// sure the result ends in `.git`. Every spelling of the same remote (HTTPS
/// with or without credentials, SSH, scp-like) maps to the same identifier.
///
/// ```
/// use stacks_library::RepositoryId;
///
/// let id = RepositoryId::from_endpoint("git@github.com:acme/stacks").unwrap();
/// assert_eq!(id.as_str(), "github.com/acme/stacks.git");
/// let id = RepositoryId::from_endpoint("https://user:pw@github.com:443/acme/stacks.git").unwrap();
/// assert_eq!(id.as_str(), "github.com/acme/stacks.git");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("{_0}")]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Normalise an endpoint into a repository identifier.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::InvalidEndpoint`] if the endpoint is empty, has a
    /// malformed port, lacks a host (for anything but `file://`), or has no
    /// path.
    pub fn from_endpoint(endpoint: &str) -> Result<Self> {
        let invalid = || Error::from(ErrorKind::InvalidEndpoint(endpoint.to_string()));
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(invalid());
        }

        let (host, path) = if endpoint.contains("://") {
            let captures = URL.captures(endpoint).ok_or_else(invalid)?;
            let scheme = &captures["scheme"];
            let host = captures.name("host").map_or("", |m| m.as_str());
            if let Some(port) = captures.name("port")
                && !port.as_str().chars().all(|c| c.is_ascii_digit())
            {
                return Err(invalid());
            }
            if host.is_empty() && !scheme.eq_ignore_ascii_case("file") {
                return Err(invalid());
            }
            (host, captures.name("path").map_or("", |m| m.as_str()))
        } else if let Some(captures) = SCP.captures(endpoint) {
            let host = captures.name("host").map_or("", |m| m.as_str());
            (host, captures.name("path").map_or("", |m| m.as_str()))
        } else {
            ("", endpoint)
        };

        let path = join("", path);
        if path.is_empty() {
            return Err(invalid());
        }
        let mut id = join(host, &path);
        if !id.ends_with(SUFFIX) {
            id.push_str(SUFFIX);
        }
        Ok(Self(id))
    }

    /// Use an already canonical identifier as-is.
    pub fn verbatim(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Where the repository lives, relative to its location's root.
    pub(crate) fn relative_path(&self) -> &Path {
        Path::new(self.0.trim_start_matches('/'))
    }
}

impl FromStr for RepositoryId {
    type Err = Error;

    fn from_str(endpoint: &str) -> Result<Self> {
        Self::from_endpoint(endpoint)
    }
}

/// Lexically join `host` and `path`, dropping empty and `.` segments and
/// resolving `..`. The result is always relative and never ends in `/`.
fn join(host: &str, path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in host.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            segment => segments.push(segment),
        }
    }
    segments.join("/")
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
        #[display("{_0}")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a location, unique within its library.
    LocationId
);
opaque_id!(
    /// Identifier of a library, unique within an aggregator.
    LibraryId
);
