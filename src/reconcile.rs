//! Catalog reconciliation: one full pass from filesystem to catalog.
//!
//! A [`Reconciler`] owns its catalog handle and a walker over the library
//! root. Each call to [`Reconciler::run_pass`] makes the catalog match the
//! tree as it is right now:
//!
//! 1. List slot folders. A missing library root aborts the pass.
//! 2. Group folders by slug and upsert one SlotGame per slug.
//! 3. Walk each folder of the group, reading file metadata in parallel.
//! 4. Upsert one Asset per image, keyed by storage key.
//! 5. Prune the SlotGame's assets that were not seen in this pass.
//! 6. Delete SlotGames whose slug no longer appears (assets first).
//! 7. Flush the catalog and return a [`ScanReport`].
//!
//! ## Slug Collisions
//!
//! Folders such as `Dragon Quest` and `dragon-quest` share the slug
//! `dragon-quest`. They become one SlotGame named after the last of them in
//! sorted order, their assets are merged, and pruning runs once against the
//! combined seen set. Repeated passes over the same tree stay write-free.
//!
//! ## Partial Failures
//!
//! Only a missing library root or a catalog error fails a pass. A corrupt image
//! is cataloged without dimensions, a file that vanished between listing and
//! stat is skipped, and any other stat failure records a size of zero.
//!
//! Deletions need a complete seen set. If a slot's walk hits an entry it cannot
//! read, that slot's prune is skipped for the pass; if the library root itself
//! has unreadable entries, no SlotGame is removed. Both are counted in
//! [`ScanReport::prunes_deferred`] and retried on the next pass.

use crate::catalog::{AssetDraft, Catalog, CatalogError, Upserted};
use crate::config::LibraryConfig;
use crate::metadata::{FileMetadata, HeaderProbe, ImageProbe, read_dimensions, read_file_metadata};
use crate::slug::slugify;
use crate::storage::StorageLayout;
use crate::walk::{
    DiscoveredImage, SkipReason, SlotFolder, Traversal, WalkError, WalkItem, Walker,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Everything a pass needs to know about the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub layout: StorageLayout,
    pub traversal: Traversal,
    /// Directories never treated as slot folders, such as a catalog kept
    /// inside the library root.
    pub exclude: Vec<PathBuf>,
}

impl SyncSettings {
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            layout: StorageLayout::new(config.library_root(), config.key_prefix()),
            traversal: config.traversal,
            exclude: config.catalog_path_forms(),
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let abs = std::path::absolute(path).ok();
        self.exclude.iter().any(|ex| {
            path.starts_with(ex) || abs.as_deref().is_some_and(|abs| abs.starts_with(ex))
        })
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Distinct slugs found in the library root.
    pub slots_seen: usize,
    pub slots_created: usize,
    pub slots_updated: usize,
    /// Folders merged into another folder's SlotGame by a shared slug.
    pub slug_collisions: usize,
    pub assets_created: usize,
    pub assets_updated: usize,
    pub assets_unchanged: usize,
    /// Assets deleted, including those of removed slots.
    pub assets_pruned: usize,
    pub slots_removed: usize,
    /// Walk entries that did not become assets.
    pub skipped: usize,
    /// Images filed under ELEMENTS because their folder name is unrecognized.
    pub unknown_category: usize,
    /// Images cataloged without dimensions or with an unknown size.
    pub metadata_failures: usize,
    /// Deletions held back because part of the tree could not be read.
    pub prunes_deferred: usize,
}

impl ScanReport {
    /// Number of catalog records written or deleted.
    pub fn writes(&self) -> usize {
        self.slots_created
            + self.slots_updated
            + self.assets_created
            + self.assets_updated
            + self.assets_pruned
            + self.slots_removed
    }

    pub fn assets_seen(&self) -> usize {
        self.assets_created + self.assets_updated + self.assets_unchanged
    }

    fn count_slot<T>(&mut self, outcome: &Upserted<T>) {
        match outcome {
            Upserted::Created(_) => self.slots_created += 1,
            Upserted::Updated(_) => self.slots_updated += 1,
            Upserted::Unchanged(_) => {}
        }
    }

    fn count_asset<T>(&mut self, outcome: &Upserted<T>) {
        match outcome {
            Upserted::Created(_) => self.assets_created += 1,
            Upserted::Updated(_) => self.assets_updated += 1,
            Upserted::Unchanged(_) => self.assets_unchanged += 1,
        }
    }
}

/// Result of inspecting one discovered image.
#[derive(Debug)]
enum Inspection {
    Read(FileMetadata),
    /// Stat failed for a reason other than the file being gone.
    StatFailed(FileMetadata),
    Vanished,
}

fn inspect(probe: &dyn ImageProbe, path: &Path) -> Inspection {
    match read_file_metadata(probe, path) {
        Ok(meta) => Inspection::Read(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Inspection::Vanished,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to stat file");
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Inspection::StatFailed(FileMetadata {
                size_bytes: 0,
                mime_type: crate::classify::mime_type_for(&name),
                dimensions: read_dimensions(probe, path),
            })
        }
    }
}

/// Runs passes against one catalog.
pub struct Reconciler<C: Catalog> {
    settings: SyncSettings,
    walker: Walker,
    catalog: C,
    probe: Box<dyn ImageProbe + Send>,
}

impl<C: Catalog> Reconciler<C> {
    pub fn new(settings: SyncSettings, catalog: C) -> Self {
        Self::with_probe(settings, catalog, Box::new(HeaderProbe))
    }

    pub fn with_probe(
        settings: SyncSettings,
        catalog: C,
        probe: Box<dyn ImageProbe + Send>,
    ) -> Self {
        let walker = Walker::new(settings.layout.library_root.clone(), settings.traversal);
        Self {
            settings,
            walker,
            catalog,
            probe,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Give back the catalog, flushed.
    pub fn into_catalog(self) -> Result<C, CatalogError> {
        self.catalog.flush()?;
        Ok(self.catalog)
    }

    /// Bring the catalog in line with the library as it is now.
    pub fn run_pass(&mut self) -> Result<ScanReport, SyncError> {
        let started = Instant::now();
        let mut report = ScanReport::default();

        let listing = self.walker.list_slots()?;
        let listing_complete = listing.is_complete();
        let folders: Vec<SlotFolder> = listing
            .folders
            .into_iter()
            .filter(|folder| {
                let excluded = self.settings.is_excluded(&folder.path);
                if excluded {
                    debug!(path = %folder.path.display(), "not a slot folder");
                }
                !excluded
            })
            .collect();
        let groups = group_by_slug(folders);
        report.slots_seen = groups.len();

        for (slug, folders) in &groups {
            self.sync_slot(slug, folders, &mut report)?;
        }

        if listing_complete {
            self.remove_stale_slots(&groups, &mut report)?;
        } else {
            warn!(
                unreadable = listing.unreadable,
                "library root partly unreadable; keeping slot games not seen this pass"
            );
            report.prunes_deferred += 1;
        }

        self.catalog.flush()?;

        info!(
            slots = report.slots_seen,
            created = report.assets_created,
            updated = report.assets_updated,
            unchanged = report.assets_unchanged,
            pruned = report.assets_pruned,
            slots_removed = report.slots_removed,
            skipped = report.skipped,
            unknown_category = report.unknown_category,
            metadata_failures = report.metadata_failures,
            prunes_deferred = report.prunes_deferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "library pass complete"
        );
        Ok(report)
    }

    /// Delete every SlotGame whose slug was not produced this pass.
    fn remove_stale_slots(
        &mut self,
        groups: &BTreeMap<String, Vec<SlotFolder>>,
        report: &mut ScanReport,
    ) -> Result<(), SyncError> {
        for slot in self.catalog.list_slot_games()? {
            if !groups.contains_key(&slot.slug) {
                let assets = self.catalog.delete_slot_game(&slot.id)?;
                info!(slot = %slot.name, slug = %slot.slug, assets, "removed slot game");
                report.assets_pruned += assets;
                report.slots_removed += 1;
            }
        }
        Ok(())
    }

    fn sync_slot(
        &mut self,
        slug: &str,
        folders: &[SlotFolder],
        report: &mut ScanReport,
    ) -> Result<(), SyncError> {
        // Groups are never empty; folders arrive sorted by name.
        let Some(winner) = folders.last() else {
            return Ok(());
        };
        if folders.len() > 1 {
            let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
            warn!(slug, folders = ?names, name = %winner.name, "slot folders share a slug; merging");
            report.slug_collisions += folders.len() - 1;
        }

        let slot = self.catalog.upsert_slot_game(&winner.name, slug)?;
        report.count_slot(&slot);
        let slot = slot.into_record();

        let mut seen = HashSet::new();
        let mut complete = true;
        for folder in folders {
            complete &= self.sync_folder(folder, &slot.id, &mut seen, report)?;
        }

        if !complete {
            warn!(slot = %slot.name, "slot folder partly unreadable; keeping assets not seen this pass");
            report.prunes_deferred += 1;
            return Ok(());
        }

        let pruned = self.catalog.prune_slot_assets(&slot.id, &seen)?;
        if pruned > 0 {
            info!(slot = %slot.name, pruned, "pruned missing assets");
        }
        report.assets_pruned += pruned;
        Ok(())
    }

    /// Returns whether every entry of the folder could be read.
    fn sync_folder(
        &mut self,
        folder: &SlotFolder,
        slot_game_id: &str,
        seen: &mut HashSet<String>,
        report: &mut ScanReport,
    ) -> Result<bool, SyncError> {
        let (images, complete) = collect_walk(self.walker.walk_slot(folder), report);

        let probe: &dyn ImageProbe = self.probe.as_ref();
        let inspected: Vec<(DiscoveredImage, Inspection)> = images
            .into_par_iter()
            .map(|image| {
                let inspection = inspect(probe, &image.path);
                (image, inspection)
            })
            .collect();

        for (image, inspection) in inspected {
            let meta = match inspection {
                Inspection::Read(meta) => {
                    if meta.dimensions.is_none() {
                        report.metadata_failures += 1;
                    }
                    meta
                }
                Inspection::StatFailed(meta) => {
                    report.metadata_failures += 1;
                    meta
                }
                Inspection::Vanished => {
                    debug!(path = %image.path.display(), "file vanished before stat");
                    report.skipped += 1;
                    continue;
                }
            };
            let Some(storage_key) = self.settings.layout.key_for(&image.path) else {
                warn!(path = %image.path.display(), "image outside library root");
                report.skipped += 1;
                continue;
            };

            let signal = image.signal();
            if signal.is_unknown() {
                debug!(
                    storage_key,
                    folder = image.category_signal.as_deref().unwrap_or_default(),
                    "unknown category folder, filing as ELEMENTS"
                );
                report.unknown_category += 1;
            }

            let file_name = image
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let draft = AssetDraft {
                slot_game_id: slot_game_id.to_string(),
                category: signal.category(),
                file_name,
                storage_key: storage_key.clone(),
                mime_type: meta.mime_type.to_string(),
                width: meta.dimensions.map(|d| d.width),
                height: meta.dimensions.map(|d| d.height),
                size_bytes: meta.size_bytes,
            };
            let outcome = self.catalog.upsert_asset(draft)?;
            if outcome.wrote() {
                debug!(storage_key, "upserted asset");
            }
            report.count_asset(&outcome);
            seen.insert(storage_key);
        }
        Ok(complete)
    }
}

/// Split a slot walk into images and skips. The flag is false when any entry
/// could not be read, meaning the images are not the whole folder.
fn collect_walk(
    items: impl Iterator<Item = WalkItem>,
    report: &mut ScanReport,
) -> (Vec<DiscoveredImage>, bool) {
    let mut images = Vec::new();
    let mut complete = true;
    for item in items {
        match item {
            WalkItem::Image(image) => images.push(image),
            WalkItem::Skipped(entry) => {
                debug!(path = %entry.path.display(), reason = ?entry.reason, "skipped");
                if entry.reason == SkipReason::Unreadable {
                    complete = false;
                }
                report.skipped += 1;
            }
        }
    }
    (images, complete)
}

/// Slot folders keyed by slug, each group in folder-name order.
fn group_by_slug(folders: Vec<SlotFolder>) -> BTreeMap<String, Vec<SlotFolder>> {
    let mut groups: BTreeMap<String, Vec<SlotFolder>> = BTreeMap::new();
    for folder in folders {
        groups.entry(slugify(&folder.name)).or_default().push(folder);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.name.cmp(&b.name));
    }
    groups
}
