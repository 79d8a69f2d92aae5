//! Path classification: image detection, MIME inference, and category folders.
//!
//! Everything here is a pure function of a file or folder *name*. No file is
//! opened and nothing is counted; callers that need observability (the
//! reconciler's "unknown category" counter) inspect the returned
//! [`CategorySignal`] themselves.
//!
//! ## Category Folders
//!
//! ```text
//! library/
//! └── Dragon Quest!/
//!     ├── bg/          → BG        (also: background)
//!     ├── text/        → TEXT
//!     ├── elements/    → ELEMENTS  (also: element)
//!     └── misc/        → ELEMENTS  (unknown, counted)
//! ```
//!
//! Matching is case-insensitive: `BG/`, `Background/` and `bg/` are the same
//! category.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Role of an asset within a slot. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Background art.
    Bg,
    /// Text overlays.
    Text,
    /// Decorative elements. Also the fallback for unrecognized folders.
    Elements,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Bg, Category::Text, Category::Elements];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bg => "BG",
            Category::Text => "TEXT",
            Category::Elements => "ELEMENTS",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown kind '{0}': kind must be BG|TEXT|ELEMENTS")]
pub struct ParseCategoryError(pub String);

/// Parses a listing filter. Accepts `ELEMENT` as an alias of `ELEMENTS`.
impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BG" => Ok(Category::Bg),
            "TEXT" => Ok(Category::Text),
            "ELEMENTS" | "ELEMENT" => Ok(Category::Elements),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// What a category folder name says about the files below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySignal {
    /// One of the recognized folder names.
    Known(Category),
    /// A non-empty name that matches nothing. Falls back to `ELEMENTS`.
    Unknown,
    /// No folder at all (file sits directly in the slot folder).
    Missing,
}

impl CategorySignal {
    /// The category an asset under this signal is cataloged with.
    pub fn category(self) -> Category {
        match self {
            CategorySignal::Known(category) => category,
            CategorySignal::Unknown | CategorySignal::Missing => Category::Elements,
        }
    }

    pub fn is_unknown(self) -> bool {
        self == CategorySignal::Unknown
    }
}

/// Classify a category folder name.
pub fn classify_folder(name: &str) -> CategorySignal {
    let normalized = name.trim().to_lowercase();
    match normalized.as_str() {
        "" => CategorySignal::Missing,
        "bg" | "background" => CategorySignal::Known(Category::Bg),
        "text" => CategorySignal::Known(Category::Text),
        "elements" | "element" => CategorySignal::Known(Category::Elements),
        _ => CategorySignal::Unknown,
    }
}

/// Category for a folder name, with the `ELEMENTS` fallback applied.
pub fn category_for(name: &str) -> Category {
    classify_folder(name).category()
}

fn extension_lowercase(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// True iff the extension is one the library catalogs.
///
/// Dotfiles without a further extension (`.png`) have no extension and are
/// not images.
pub fn is_image_file(name: &str) -> bool {
    extension_lowercase(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type implied by the extension. Content is never inspected.
pub fn mime_type_for(name: &str) -> &'static str {
    match extension_lowercase(name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
