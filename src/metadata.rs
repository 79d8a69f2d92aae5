//! Per-file metadata: byte size, MIME type, and pixel dimensions.
//!
//! Dimension reads go through the [`ImageProbe`] trait so the rest of the
//! crate never touches an image decoder directly. The production probe,
//! [`HeaderProbe`], parses only the image header via the `image` crate; the
//! pixels are never decoded.
//!
//! # Partial-Failure Policy
//!
//! A corrupt, truncated or unsupported image must never abort a sync pass.
//! [`read_dimensions`] logs a warning and returns `None`; the asset is still
//! cataloged, with null dimensions.

use crate::classify::mime_type_for;
use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Unreadable image header: {0}")]
    Header(#[from] image::ImageError),
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Reads pixel dimensions and byte size from an image file.
///
/// `Sync` so probes can be shared across rayon workers.
pub trait ImageProbe: Sync {
    fn identify(&self, path: &Path) -> Result<Dimensions, ProbeError>;

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Header-only probe backed by the `image` crate.
///
/// The format is guessed from the leading bytes, falling back to the file
/// extension, so a JPEG saved as `.png` still yields dimensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderProbe;

impl ImageProbe for HeaderProbe {
    fn identify(&self, path: &Path) -> Result<Dimensions, ProbeError> {
        let (width, height) = ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()?;
        Ok(Dimensions { width, height })
    }
}

/// Everything the catalog records about a file besides its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size_bytes: u64,
    pub mime_type: &'static str,
    pub dimensions: Option<Dimensions>,
}

/// Read dimensions, logging and swallowing any failure.
pub fn read_dimensions(probe: &dyn ImageProbe, path: &Path) -> Option<Dimensions> {
    match probe.identify(path) {
        Ok(dims) => Some(dims),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read image size");
            None
        }
    }
}

/// Stat the file and probe its dimensions.
///
/// Only the stat can fail; a file that disappeared or cannot be stat'ed is
/// reported to the caller, which decides whether to catalog it.
pub fn read_file_metadata(probe: &dyn ImageProbe, path: &Path) -> io::Result<FileMetadata> {
    let size_bytes = probe.file_size(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    Ok(FileMetadata {
        size_bytes,
        mime_type: mime_type_for(&name),
        dimensions: read_dimensions(probe, path),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Probe that answers from a table and records every call.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockProbe {
        pub results: HashMap<PathBuf, Dimensions>,
        /// Paths whose stat fails with this error kind.
        pub stat_errors: HashMap<PathBuf, io::ErrorKind>,
        pub calls: Mutex<Vec<PathBuf>>,
    }

    impl ImageProbe for MockProbe {
        fn identify(&self, path: &Path) -> Result<Dimensions, ProbeError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            self.results.get(path).copied().ok_or_else(|| {
                ProbeError::Io(io::Error::new(io::ErrorKind::InvalidData, "not in table"))
            })
        }

        fn file_size(&self, path: &Path) -> io::Result<u64> {
            match self.stat_errors.get(path) {
                Some(kind) => Err(io::Error::from(*kind)),
                None => Ok(std::fs::metadata(path)?.len()),
            }
        }
    }

    #[test]
    fn header_probe_reads_png() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sky.png");
        crate::test_helpers::write_png(&path, 64, 48);

        let dims = HeaderProbe.identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 64, height: 48 });
    }

    #[test]
    fn header_probe_reads_jpeg() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coin.jpg");
        crate::test_helpers::write_jpeg(&path, 30, 20);

        let dims = HeaderProbe.identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 30, height: 20 });
    }

    #[test]
    fn header_probe_guesses_format_from_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("misnamed.png");
        crate::test_helpers::write_jpeg(&path, 12, 10);

        let dims = HeaderProbe.identify(&path).unwrap();
        assert_eq!(dims, Dimensions { width: 12, height: 10 });
    }

    #[test]
    fn garbage_bytes_yield_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(HeaderProbe.identify(&path).is_err());
        assert_eq!(read_dimensions(&HeaderProbe, &path), None);
    }

    #[test]
    fn missing_file_yields_none() {
        assert_eq!(
            read_dimensions(&HeaderProbe, Path::new("/nonexistent/sky.png")),
            None
        );
    }

    #[test]
    fn file_metadata_for_corrupt_image_keeps_size_and_mime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.webp");
        std::fs::write(&path, b"0123456789").unwrap();

        let meta = read_file_metadata(&HeaderProbe, &path).unwrap();
        assert_eq!(meta.size_bytes, 10);
        assert_eq!(meta.mime_type, "image/webp");
        assert_eq!(meta.dimensions, None);
    }

    #[test]
    fn file_metadata_uses_probe() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        std::fs::write(&path, b"x").unwrap();

        let mut probe = MockProbe::default();
        probe.results.insert(
            path.clone(),
            Dimensions {
                width: 7,
                height: 9,
            },
        );

        let meta = read_file_metadata(&probe, &path).unwrap();
        assert_eq!(
            meta.dimensions,
            Some(Dimensions {
                width: 7,
                height: 9
            })
        );
        assert_eq!(probe.calls.lock().unwrap().as_slice(), &[path]);
    }

    #[test]
    fn injected_stat_error_surfaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.png");
        crate::test_helpers::write_png(&path, 4, 4);

        let mut probe = MockProbe::default();
        probe
            .stat_errors
            .insert(path.clone(), io::ErrorKind::PermissionDenied);
        let err = read_file_metadata(&probe, &path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn stat_failure_is_reported() {
        let result = read_file_metadata(&HeaderProbe, Path::new("/nonexistent/a.png"));
        assert!(result.is_err());
    }
}
