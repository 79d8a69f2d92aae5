//! Storage keys: the catalog's name for a file on disk.
//!
//! A storage key is the key prefix followed by the file's path relative to the
//! library root, always with forward slashes:
//!
//! ```text
//! storage/library/Dragon Quest!/bg/sky.png
//! └── prefix ───┘ └── relative to root ──┘
//! ```
//!
//! [`StorageLayout`] converts in both directions. Resolving a key back to a
//! path refuses anything that would escape the library root.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Storage key is outside the library (expected prefix '{prefix}/'): {key}")]
    OutsideLibrary { key: String, prefix: String },
    #[error("Storage key escapes the library root: {0}")]
    Traversal(String),
    #[error("No file for storage key: {}", .0.display())]
    NotFound(PathBuf),
}

/// Where the library lives and how its files are keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub library_root: PathBuf,
    /// Prepended to every key; no leading or trailing slash. May be empty.
    pub key_prefix: String,
}

impl StorageLayout {
    pub fn new(library_root: impl Into<PathBuf>, key_prefix: impl Into<String>) -> Self {
        Self {
            library_root: library_root.into(),
            key_prefix: key_prefix.into(),
        }
    }

    /// Storage key for a file under the library root, `None` if it is not under it.
    pub fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.library_root).ok()?;
        let segments: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if segments.is_empty() {
            return None;
        }
        let rel = segments.join("/");
        if self.key_prefix.is_empty() {
            Some(rel)
        } else {
            Some(format!("{}/{}", self.key_prefix, rel))
        }
    }

    /// Map a storage key back to the file it names.
    ///
    /// Backslashes are accepted as separators. The key must carry the prefix
    /// and the rest must be plain relative segments: no `..`, `.`, root or
    /// drive components. The file must exist.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, ResolveError> {
        let normalized = key.replace('\\', "/");

        let rest = if self.key_prefix.is_empty() {
            normalized.as_str()
        } else {
            normalized
                .strip_prefix(self.key_prefix.as_str())
                .and_then(|r| r.strip_prefix('/'))
                .ok_or_else(|| ResolveError::OutsideLibrary {
                    key: key.to_string(),
                    prefix: self.key_prefix.clone(),
                })?
        };

        let rel = Path::new(rest);
        let plain = !rest.is_empty()
            && !rest
                .split('/')
                .any(|s| s.is_empty() || s == "." || s == ".." || s.contains(':'))
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(ResolveError::Traversal(key.to_string()));
        }

        let path = self.library_root.join(rel);
        if !path.is_file() {
            return Err(ResolveError::NotFound(path));
        }
        Ok(path)
    }
}
