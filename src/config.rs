//! Library configuration module.
//!
//! Handles loading, validating, and merging `library.toml`. Stock defaults are
//! overridden by the user file, and CLI flags override both.
//!
//! ## Config File Location
//!
//! `library.toml` in the working directory is picked up automatically;
//! `--config <path>` points elsewhere. Without a file the stock defaults apply.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! storage_dir = "storage"          # Library root is <storage_dir>/library
//! # key_prefix = "storage/library"   (default: <storage_dir>/library)
//! # catalog_path = "storage/catalog"  (default: <storage_dir>/catalog)
//! traversal = "recursive"          # or "flat"
//!
//! [watch]
//! debounce_ms = 400                # Quiet period before a rescan
//! stability_ms = 300               # A touched file must be unchanged this long
//! poll_interval_ms = 100           # How often unstable files are re-checked
//!
//! [metadata]
//! max_threads = 4                  # Parallel header reads (omit for auto)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::walk::Traversal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "library.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Library configuration loaded from `library.toml`.
///
/// All fields have defaults matching the conventional `storage/library`
/// layout. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Storage directory; the library root is its `library/` subfolder.
    pub storage_dir: PathBuf,
    /// Prefix of every storage key, without a trailing slash.
    /// Defaults to `<storage_dir>/library` with forward slashes.
    pub key_prefix: Option<String>,
    /// Catalog database location. Defaults to `<storage_dir>/catalog`.
    pub catalog_path: Option<PathBuf>,
    /// Discovery policy below each slot folder.
    pub traversal: Traversal,
    /// Watch-mode timing.
    pub watch: WatchConfig,
    /// Metadata read settings.
    pub metadata: MetadataConfig,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("storage"),
            key_prefix: None,
            catalog_path: None,
            traversal: Traversal::default(),
            watch: WatchConfig::default(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl LibraryConfig {
    pub fn library_root(&self) -> PathBuf {
        self.storage_dir.join("library")
    }

    pub fn key_prefix(&self) -> String {
        if let Some(prefix) = &self.key_prefix {
            return prefix.clone();
        }
        let dir = self.storage_dir.to_string_lossy().replace('\\', "/");
        let dir = dir.strip_prefix("./").unwrap_or(&dir).trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            "library".to_string()
        } else {
            format!("{}/library", dir)
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("catalog"))
    }

    /// The catalog path as configured, made absolute, and canonicalized when
    /// it exists. Paths under any of these belong to the catalog.
    pub fn catalog_path_forms(&self) -> Vec<PathBuf> {
        let catalog = self.catalog_path();
        let mut forms = Vec::new();
        if let Ok(abs) = std::path::absolute(&catalog) {
            forms.push(abs);
        }
        if let Ok(canonical) = std::fs::canonicalize(&catalog) {
            forms.push(canonical);
        }
        forms.push(catalog);
        forms.dedup();
        forms
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage_dir must not be empty".into(),
            ));
        }
        if let Some(prefix) = &self.key_prefix {
            if prefix.starts_with('/') || prefix.ends_with('/') {
                return Err(ConfigError::Validation(
                    "key_prefix must not start or end with '/'".into(),
                ));
            }
            if prefix.contains('\\') {
                return Err(ConfigError::Validation(
                    "key_prefix must use forward slashes".into(),
                ));
            }
        }
        let catalog = std::path::absolute(self.catalog_path())?;
        let root = std::path::absolute(self.library_root())?;
        if root.starts_with(&catalog) {
            return Err(ConfigError::Validation(
                "catalog_path must not contain the library root".into(),
            ));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.debounce_ms must be non-zero".into(),
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "watch.poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.metadata.max_threads == Some(0) {
            return Err(ConfigError::Validation(
                "metadata.max_threads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Watch-mode debounce and write-stability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    /// Quiet period after the last event before a rescan starts.
    pub debounce_ms: u64,
    /// How long a touched file must stay unchanged before it counts as written.
    pub stability_ms: u64,
    /// Re-check cadence while waiting for files to settle.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            stability_ms: 300,
            poll_interval_ms: 100,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stability(&self) -> Duration {
        Duration::from_millis(self.stability_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Metadata read settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataConfig {
    /// Maximum number of parallel header reads.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_threads: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &MetadataConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_threads.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(LibraryConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults do not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(file: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(file)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<LibraryConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: LibraryConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `library.toml` from a directory, falling back to stock defaults.
pub fn load_config(dir: &Path) -> Result<LibraryConfig, ConfigError> {
    let overlay = load_raw_config(&dir.join(CONFIG_FILENAME))?;
    resolve_config(overlay)
}

/// Load an explicitly named config file. A missing file is an error.
pub fn load_config_file(file: &Path) -> Result<LibraryConfig, ConfigError> {
    match load_raw_config(file)? {
        Some(overlay) => resolve_config(Some(overlay)),
        None => Err(ConfigError::NotFound(file.to_path_buf())),
    }
}

/// Returns a fully-commented stock `library.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Slot Library Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags (--storage-dir, --catalog, --traversal) override
# the values in this file. Unknown keys will cause an error.

# Storage directory. Slot folders live in <storage_dir>/library.
# Also settable with the STORAGE_DIR environment variable.
storage_dir = "storage"

# Prefix of every asset storage key. Defaults to <storage_dir>/library, so
# a file at
#   storage/library/Dragon Quest!/bg/sky.png
# is cataloged under that same key.
# key_prefix = "storage/library"

# Catalog database directory. Defaults to <storage_dir>/catalog.
# catalog_path = "storage/catalog"

# How images below a slot folder are discovered:
#   "recursive"  any depth; the first folder below the slot picks the category
#   "flat"       only files directly inside bg/, text/, elements/ (and aliases)
traversal = "recursive"

# ---------------------------------------------------------------------------
# Watch mode
# ---------------------------------------------------------------------------
[watch]
# Quiet period after the last filesystem event before a rescan starts.
debounce_ms = 400

# A file touched since the last scan must be unchanged for this long before
# the rescan runs, so half-written files are never cataloged.
stability_ms = 300

# How often touched files are re-checked while waiting for them to settle.
poll_interval_ms = 100

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
[metadata]
# Maximum parallel image header reads. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_threads = 4
"##
}
