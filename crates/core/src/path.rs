//! Location parsing
//!
//! A command argument is either a local filesystem path or a remote object
//! location written as `obs://<container>[/<key>]`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// Scheme prefix that marks a remote location
pub const REMOTE_SCHEME: &str = "obs://";

/// A location inside the object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RemotePath {
    /// Container name, never empty
    pub container: String,
    /// Object key; empty denotes the container root
    pub key: String,
}

impl RemotePath {
    /// Create a new remote path
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }

    /// Whether the key names a "directory" (root or trailing slash)
    pub fn is_dir_like(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// Append a relative path to this key treated as a prefix
    pub fn join(&self, relative: &str) -> Self {
        let relative = relative.trim_start_matches('/');
        let key = if self.is_dir_like() {
            format!("{}{relative}", self.key)
        } else {
            format!("{}/{relative}", self.key)
        };
        Self::new(&self.container, key)
    }

    /// Last segment of the key, if any
    pub fn base_name(&self) -> Option<&str> {
        self.key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
    }

    /// Key of `object` relative to this path used as a prefix.
    ///
    /// Returns `None` when `object` is outside the prefix, including keys that
    /// only share a leading substring (`data` does not contain `data2/x`),
    /// the object named by the prefix itself, and directory marker objects.
    pub fn relative_key<'a>(&self, object: &'a str) -> Option<&'a str> {
        let rest = object.strip_prefix(self.key.as_str())?;
        let rest = if self.is_dir_like() {
            rest
        } else {
            rest.strip_prefix('/')?
        };
        if rest.is_empty() || rest.ends_with('/') {
            None
        } else {
            Some(rest)
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{REMOTE_SCHEME}{}/", self.container)
        } else {
            write!(f, "{REMOTE_SCHEME}{}/{}", self.container, self.key)
        }
    }
}

/// A parsed command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// Local filesystem path, kept verbatim
    Local(PathBuf),
    /// Remote object location
    Remote(RemotePath),
}

impl Location {
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote(_))
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Location::Local(path) => Some(path),
            Location::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<&RemotePath> {
        match self {
            Location::Local(_) => None,
            Location::Remote(remote) => Some(remote),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(remote) => remote.fmt(f),
        }
    }
}

/// Parse a command argument into a [`Location`].
///
/// No filesystem validation happens here; a local path that does not exist
/// is reported later by whichever operation touches it.
pub fn parse_location(input: &str) -> Result<Location> {
    let Some(rest) = input.strip_prefix(REMOTE_SCHEME) else {
        return Ok(Location::Local(PathBuf::from(input)));
    };

    let (container, key) = match rest.split_once('/') {
        Some((container, key)) => (container, key),
        None => (rest, ""),
    };

    if container.is_empty() {
        return Err(Error::Config(format!(
            "Invalid remote path '{input}': container name is empty"
        )));
    }

    Ok(Location::Remote(RemotePath::new(container, key)))
}
