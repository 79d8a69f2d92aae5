//! Shared test utilities for the slot-library test suite.
//!
//! [`TestLibrary`] lays out a throwaway `storage/` directory in a temp dir
//! with a `library/` root inside it, mirroring the production layout, and
//! writes real PNG/JPEG files so dimension reads exercise the decoder.
//!
//! ```text
//! use crate::test_helpers::*;
//!
//! let lib = TestLibrary::new();
//! lib.add_png("Dragon Quest!/bg/sky.png", 64, 64);
//! lib.add_garbage("Dragon Quest!/bg/broken.png");
//!
//! let mut reconciler = Reconciler::new(lib.settings(), MemoryCatalog::new());
//! let report = reconciler.run_pass().unwrap();
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::LibraryConfig;
use crate::reconcile::SyncSettings;
use crate::walk::Traversal;

// =========================================================================
// Image writers
// =========================================================================

/// Write a valid PNG of the given size.
pub fn write_png(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 200])
    });
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

/// Write a valid baseline JPEG of the given size.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    ensure_parent(path);
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 30]));
    img.save_with_format(path, image::ImageFormat::Jpeg).unwrap();
}

fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
}

// =========================================================================
// Library fixture
// =========================================================================

/// A temp `storage/library` tree. Dropped with the temp dir.
pub struct TestLibrary {
    tmp: TempDir,
}

impl TestLibrary {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("storage/library")).unwrap();
        Self { tmp }
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.tmp.path().join("storage")
    }

    pub fn root(&self) -> PathBuf {
        self.storage_dir().join("library")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn add_png(&self, rel: &str, width: u32, height: u32) -> PathBuf {
        let path = self.path(rel);
        write_png(&path, width, height);
        path
    }

    pub fn add_jpeg(&self, rel: &str, width: u32, height: u32) -> PathBuf {
        let path = self.path(rel);
        write_jpeg(&path, width, height);
        path
    }

    pub fn add_bytes(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.path(rel);
        ensure_parent(&path);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// An image-named file that no decoder accepts.
    pub fn add_garbage(&self, rel: &str) -> PathBuf {
        self.add_bytes(rel, b"\x00\x01garbage, not an image\xff")
    }

    pub fn add_dir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn remove(&self, rel: &str) {
        let path = self.path(rel);
        if path.is_dir() {
            std::fs::remove_dir_all(path).unwrap();
        } else {
            std::fs::remove_file(path).unwrap();
        }
    }

    pub fn rename(&self, from: &str, to: &str) {
        std::fs::rename(self.path(from), self.path(to)).unwrap();
    }

    /// Config rooted at this library, recursive traversal.
    pub fn config(&self) -> LibraryConfig {
        LibraryConfig {
            storage_dir: self.storage_dir(),
            key_prefix: Some("storage/library".to_string()),
            catalog_path: Some(self.tmp.path().join("catalog")),
            ..LibraryConfig::default()
        }
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings::from_config(&self.config())
    }

    pub fn settings_with(&self, traversal: Traversal) -> SyncSettings {
        SyncSettings {
            traversal,
            ..self.settings()
        }
    }
}
