//! Workspace-relative file paths
//!
//! Provides [`WorkspacePath`], the only way the engine names a file it may
//! read, snapshot or rewrite. Paths are normalized to `/`-separated relative
//! form and can never escape the workspace root.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Normalized, relative path inside a workspace
///
/// # Examples
/// - `src/lib.rs` → `src/lib.rs`
/// - `./src//main.rs` → `src/main.rs`
/// - `../etc/passwd` → rejected
/// - `/abs/file` → rejected
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspacePath(String);

impl WorkspacePath {
    /// Parse and normalize a relative path
    ///
    /// # Errors
    /// Returns error for empty, absolute, parent-traversing or NUL-bearing paths
    pub fn new(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::ContainsNul);
        }
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') || Path::new(raw).is_absolute() || has_drive_prefix(&unified) {
            return Err(PathError::Absolute(raw.to_string()));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(PathError::Traversal(raw.to_string())),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// Express an absolute path relative to `root`
    ///
    /// # Errors
    /// Returns error if `path` is not under `root`
    pub fn relative_to(root: &Path, path: &Path) -> Result<Self, PathError> {
        let rel = path
            .strip_prefix(root)
            .map_err(|_| PathError::OutsideWorkspace(path.display().to_string()))?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return Err(PathError::Traversal(path.display().to_string())),
            }
        }
        Self::new(&parts.join("/"))
    }

    /// Path as a `/`-separated string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location under `root`
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }

    /// File extension, if any
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        (!stem.is_empty()).then_some(ext)
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl Display for WorkspacePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspacePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for WorkspacePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for WorkspacePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for WorkspacePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Errors from path validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Empty path
    #[error("empty path")]
    Empty,

    /// Absolute path where a relative one is required
    #[error("absolute path not allowed: {0}")]
    Absolute(String),

    /// Path climbs out with `..`
    #[error("path traversal not allowed: {0}")]
    Traversal(String),

    /// Path is not under the workspace root
    #[error("path outside workspace: {0}")]
    OutsideWorkspace(String),

    /// Embedded NUL byte
    #[error("path contains NUL byte")]
    ContainsNul,
}
