//! Library directory walking.
//!
//! The walker turns the library root into slot folders and, per slot, a lazy
//! stream of [`WalkItem`]s. It only reads directory entries: files are never
//! opened and the catalog is never touched. Classification beyond "which
//! folder did this come from" is left to the caller.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/library/                 # Library root
//! ├── Dragon Quest!/               # Slot folder (one SlotGame)
//! │   ├── bg/                      # Category folder
//! │   │   ├── sky.png
//! │   │   └── night/               # Recursive mode only: still BG
//! │   │       └── moon.webp
//! │   ├── elements/
//! │   │   └── coin.jpg
//! │   └── notes.txt                # Skipped: not an image
//! └── Foo/
//!     └── unknowncat/              # Recursive: ELEMENTS (unknown)
//!         └── pic.webp             # Flat: whole folder skipped
//! ```
//!
//! ## Traversal Policies
//!
//! - [`Traversal::Recursive`] (default): every image anywhere below the slot
//!   folder is yielded. Its category signal is the *first* path segment below
//!   the slot root; images directly in the slot folder carry no signal.
//! - [`Traversal::Flat`]: only direct children of recognized category folders
//!   are yielded. Unrecognized folders, nested folders and loose files in the
//!   slot folder are yielded as [`WalkItem::Skipped`].
//!
//! Entries are visited in file-name order and symlinks are not followed.

use crate::classify::{self, CategorySignal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WalkError {
    #[error("Library root not found: {path}")]
    RootNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How deep below a slot folder images are discovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Traversal {
    /// One level of recognized category folders.
    Flat,
    /// Arbitrary depth; category from the first segment.
    #[default]
    Recursive,
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traversal::Flat => f.write_str("flat"),
            Traversal::Recursive => f.write_str("recursive"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown traversal '{0}': expected 'flat' or 'recursive'")]
pub struct ParseTraversalError(pub String);

impl FromStr for Traversal {
    type Err = ParseTraversalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(Traversal::Flat),
            "recursive" => Ok(Traversal::Recursive),
            _ => Err(ParseTraversalError(s.to_string())),
        }
    }
}

/// An immediate subdirectory of the library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFolder {
    /// Folder name, verbatim. Becomes the SlotGame display name.
    pub name: String,
    pub path: PathBuf,
}

/// Slot folders of the library root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotListing {
    /// Sorted by name.
    pub folders: Vec<SlotFolder>,
    /// Root entries whose type could not be determined.
    pub unreadable: usize,
}

impl SlotListing {
    pub fn is_complete(&self) -> bool {
        self.unreadable == 0
    }
}

/// An image file found under a slot folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredImage {
    pub slot: String,
    /// First path segment below the slot root, `None` for loose files.
    pub category_signal: Option<String>,
    pub path: PathBuf,
}

impl DiscoveredImage {
    pub fn signal(&self) -> CategorySignal {
        match &self.category_signal {
            Some(segment) => classify::classify_folder(segment),
            None => CategorySignal::Missing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A file whose extension is not a cataloged image type.
    NonImage,
    /// Flat mode: a folder that is not a recognized category.
    UnrecognizedFolder,
    /// Flat mode: a folder nested inside a category folder.
    NestedFolder,
    /// Flat mode: a file directly in the slot folder.
    LooseFile,
    /// The entry could not be read.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    Image(DiscoveredImage),
    Skipped(SkippedEntry),
}

/// Stateless walker over one library root.
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    traversal: Traversal,
}

impl Walker {
    pub fn new(root: impl Into<PathBuf>, traversal: Traversal) -> Self {
        Self {
            root: root.into(),
            traversal,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    /// Immediate subdirectories of the root, sorted by name.
    ///
    /// Failing to read the root is the one unrecoverable walk error.
    pub fn slots(&self) -> Result<Vec<SlotFolder>, WalkError> {
        Ok(self.list_slots()?.folders)
    }

    /// Like [`Walker::slots`], but also counts root entries that could not be
    /// read. A listing with unreadable entries may be missing slot folders.
    pub fn list_slots(&self) -> Result<SlotListing, WalkError> {
        let entries = fs::read_dir(&self.root).map_err(|source| WalkError::RootNotFound {
            path: self.root.clone(),
            source,
        })?;

        let mut listing = SlotListing::default();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "unreadable library entry");
                    listing.unreadable += 1;
                    continue;
                }
            };
            match entry.file_type() {
                Ok(t) if t.is_dir() => listing.folders.push(SlotFolder {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    path: entry.path(),
                }),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "unreadable library entry");
                    listing.unreadable += 1;
                }
            }
        }

        listing.folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    /// Lazily walk one slot folder.
    pub fn walk_slot(&self, slot: &SlotFolder) -> SlotWalk {
        let walk = WalkDir::new(&slot.path)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        SlotWalk {
            inner: walk.into_iter(),
            slot: slot.name.clone(),
            slot_root: slot.path.clone(),
            traversal: self.traversal,
        }
    }

    /// Walk every slot in order, as one stream.
    pub fn walk(&self) -> Result<impl Iterator<Item = WalkItem> + '_, WalkError> {
        let slots = self.slots()?;
        Ok(slots
            .into_iter()
            .flat_map(move |slot| self.walk_slot(&slot)))
    }
}

/// Iterator over one slot folder. See [`Walker::walk_slot`].
pub struct SlotWalk {
    inner: walkdir::IntoIter,
    slot: String,
    slot_root: PathBuf,
    traversal: Traversal,
}

impl SlotWalk {
    fn first_segment(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.slot_root)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
    }

    fn skipped(path: PathBuf, reason: SkipReason) -> Option<WalkItem> {
        Some(WalkItem::Skipped(SkippedEntry { path, reason }))
    }
}

impl Iterator for SlotWalk {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.slot_root.clone());
                    warn!(slot = %self.slot, path = %path.display(), error = %e, "unreadable entry");
                    return Self::skipped(path, SkipReason::Unreadable);
                }
            };

            let depth = entry.depth();
            let is_dir = entry.file_type().is_dir();

            if is_dir {
                if self.traversal == Traversal::Flat {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if depth >= 2 {
                        self.inner.skip_current_dir();
                        return Self::skipped(entry.into_path(), SkipReason::NestedFolder);
                    }
                    if !matches!(classify::classify_folder(&name), CategorySignal::Known(_)) {
                        self.inner.skip_current_dir();
                        return Self::skipped(entry.into_path(), SkipReason::UnrecognizedFolder);
                    }
                }
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !classify::is_image_file(&name) {
                return Self::skipped(entry.into_path(), SkipReason::NonImage);
            }

            if depth == 1 {
                if self.traversal == Traversal::Flat {
                    return Self::skipped(entry.into_path(), SkipReason::LooseFile);
                }
                return Some(WalkItem::Image(DiscoveredImage {
                    slot: self.slot.clone(),
                    category_signal: None,
                    path: entry.into_path(),
                }));
            }

            let category_signal = self.first_segment(entry.path());
            return Some(WalkItem::Image(DiscoveredImage {
                slot: self.slot.clone(),
                category_signal,
                path: entry.into_path(),
            }));
        }
    }
}
