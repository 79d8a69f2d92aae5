//! The catalog: persisted SlotGame and Asset records.
//!
//! Everything the reconciler writes goes through the [`Catalog`] trait. Two
//! implementations exist:
//!
//! - [`SledCatalog`]: an embedded sled database on disk. This is what `scan`
//!   and `watch` write to and what the listing commands read.
//! - [`MemoryCatalog`]: ordered maps in memory. Used for `check` dry runs and
//!   in tests.
//!
//! ## Natural Keys
//!
//! Slot games are keyed by slug, assets by storage key. Ids are ULIDs assigned
//! on creation and never reassigned, so a record keeps its id across every
//! pass that rediscovers it.
//!
//! ## Write Avoidance
//!
//! Upserts compare the derived fields against the stored record and return
//! [`Upserted::Unchanged`] without writing when they match. A second pass over
//! an unchanged tree therefore performs no writes at all.

mod memory;
mod sled_store;

pub use memory::MemoryCatalog;
pub use sled_store::SledCatalog;

use crate::classify::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },
    #[error("Catalog database error: {0}")]
    Db(#[from] sled::Error),
    #[error("Corrupt catalog record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A named asset collection, one per slot folder (or per slug, see
/// [`crate::reconcile`] for collisions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotGame {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// One cataloged image file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub slot_game_id: String,
    pub category: Category,
    pub file_name: String,
    pub storage_key: String,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: u64,
}

/// Everything derived from the filesystem for one asset; the catalog adds the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDraft {
    pub slot_game_id: String,
    pub category: Category,
    pub file_name: String,
    pub storage_key: String,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size_bytes: u64,
}

impl AssetDraft {
    /// True when storing this draft over `asset` would change nothing.
    pub fn matches(&self, asset: &Asset) -> bool {
        self.slot_game_id == asset.slot_game_id
            && self.category == asset.category
            && self.file_name == asset.file_name
            && self.storage_key == asset.storage_key
            && self.mime_type == asset.mime_type
            && self.width == asset.width
            && self.height == asset.height
            && self.size_bytes == asset.size_bytes
    }

    pub fn into_asset(self, id: String) -> Asset {
        Asset {
            id,
            slot_game_id: self.slot_game_id,
            category: self.category,
            file_name: self.file_name,
            storage_key: self.storage_key,
            mime_type: self.mime_type,
            width: self.width,
            height: self.height,
            size_bytes: self.size_bytes,
        }
    }
}

/// Outcome of an upsert, carrying the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upserted<T> {
    Created(T),
    Updated(T),
    /// Stored record already matched; nothing was written.
    Unchanged(T),
}

impl<T> Upserted<T> {
    pub fn record(&self) -> &T {
        match self {
            Upserted::Created(r) | Upserted::Updated(r) | Upserted::Unchanged(r) => r,
        }
    }

    pub fn into_record(self) -> T {
        match self {
            Upserted::Created(r) | Upserted::Updated(r) | Upserted::Unchanged(r) => r,
        }
    }

    pub fn wrote(&self) -> bool {
        !matches!(self, Upserted::Unchanged(_))
    }
}

/// New catalog id.
pub(crate) fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Persisted store of slot games and their assets.
///
/// Implementations assume a single writer.
pub trait Catalog {
    /// Create or rename the slot game with this slug.
    fn upsert_slot_game(&mut self, name: &str, slug: &str)
    -> Result<Upserted<SlotGame>, CatalogError>;

    /// Create or refresh the asset with the draft's storage key.
    ///
    /// An existing asset keeps its id, even if it moves to another slot game.
    fn upsert_asset(&mut self, draft: AssetDraft) -> Result<Upserted<Asset>, CatalogError>;

    fn slot_game_by_slug(&self, slug: &str) -> Result<Option<SlotGame>, CatalogError>;

    /// All slot games, ordered by name then slug.
    fn list_slot_games(&self) -> Result<Vec<SlotGame>, CatalogError>;

    /// A slot game's assets, optionally filtered by category, ordered by file
    /// name then storage key.
    fn list_assets(
        &self,
        slot_game_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<Asset>, CatalogError>;

    /// Delete the slot game's assets whose storage key is not in `keep`.
    /// Returns the number deleted. An empty `keep` deletes all of them.
    fn prune_slot_assets(
        &mut self,
        slot_game_id: &str,
        keep: &HashSet<String>,
    ) -> Result<usize, CatalogError>;

    /// Delete a slot game and, first, all of its assets.
    /// Returns the number of assets deleted; unknown ids delete nothing.
    fn delete_slot_game(&mut self, slot_game_id: &str) -> Result<usize, CatalogError>;

    /// Make all writes so far durable.
    fn flush(&self) -> Result<(), CatalogError>;
}

/// Sort order shared by every implementation of [`Catalog::list_slot_games`].
pub(crate) fn sort_slot_games(slots: &mut [SlotGame]) {
    slots.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.slug.cmp(&b.slug)));
}

/// Sort order shared by every implementation of [`Catalog::list_assets`].
pub(crate) fn sort_assets(assets: &mut [Asset]) {
    assets.sort_by(|a, b| {
        a.file_name
            .cmp(&b.file_name)
            .then_with(|| a.storage_key.cmp(&b.storage_key))
    });
}

#[cfg(test)]
pub(crate) mod tests {
    //! Behaviour every [`Catalog`] must share. Each implementation's test
    //! module calls these against its own instance.

    use super::*;

    pub fn draft(slot_game_id: &str, storage_key: &str, category: Category) -> AssetDraft {
        let file_name = storage_key.rsplit('/').next().unwrap().to_string();
        AssetDraft {
            slot_game_id: slot_game_id.to_string(),
            category,
            mime_type: crate::classify::mime_type_for(&file_name).to_string(),
            file_name,
            storage_key: storage_key.to_string(),
            width: Some(64),
            height: Some(64),
            size_bytes: 100,
        }
    }

    fn keys(assets: &[Asset]) -> Vec<&str> {
        assets.iter().map(|a| a.storage_key.as_str()).collect()
    }

    pub fn slot_upsert_lifecycle(c: &mut impl Catalog) {
        let created = c.upsert_slot_game("Dragon Quest!", "dragon-quest").unwrap();
        assert!(matches!(created, Upserted::Created(_)));
        let id = created.record().id.clone();

        let same = c.upsert_slot_game("Dragon Quest!", "dragon-quest").unwrap();
        assert!(matches!(same, Upserted::Unchanged(_)));
        assert!(!same.wrote());

        let renamed = c.upsert_slot_game("dragon quest", "dragon-quest").unwrap();
        assert!(matches!(renamed, Upserted::Updated(_)));
        assert_eq!(renamed.record().id, id);

        let stored = c.slot_game_by_slug("dragon-quest").unwrap().unwrap();
        assert_eq!(stored.name, "dragon quest");
        assert_eq!(stored.id, id);
        assert!(c.slot_game_by_slug("nope").unwrap().is_none());
    }

    pub fn asset_upsert_lifecycle(c: &mut impl Catalog) {
        let slot = c.upsert_slot_game("S", "s").unwrap().into_record();
        let d = draft(&slot.id, "storage/library/S/bg/sky.png", Category::Bg);

        let created = c.upsert_asset(d.clone()).unwrap();
        assert!(matches!(created, Upserted::Created(_)));
        let id = created.record().id.clone();

        assert!(matches!(c.upsert_asset(d.clone()).unwrap(), Upserted::Unchanged(_)));

        let bigger = AssetDraft {
            size_bytes: 200,
            ..d
        };
        let updated = c.upsert_asset(bigger).unwrap();
        assert!(matches!(updated, Upserted::Updated(_)));
        assert_eq!(updated.record().id, id);
        assert_eq!(updated.record().size_bytes, 200);
    }

    pub fn asset_moving_slot_keeps_id(c: &mut impl Catalog) {
        let a = c.upsert_slot_game("A", "a").unwrap().into_record();
        let b = c.upsert_slot_game("B", "b").unwrap().into_record();
        let key = "storage/library/A/bg/x.png";

        let first = c.upsert_asset(draft(&a.id, key, Category::Bg)).unwrap();
        let moved = c.upsert_asset(draft(&b.id, key, Category::Bg)).unwrap();
        assert!(matches!(moved, Upserted::Updated(_)));
        assert_eq!(moved.record().id, first.record().id);

        assert!(c.list_assets(&a.id, None).unwrap().is_empty());
        assert_eq!(keys(&c.list_assets(&b.id, None).unwrap()), vec![key]);
    }

    pub fn listing_order_and_filter(c: &mut impl Catalog) {
        let zeta = c.upsert_slot_game("Zeta", "zeta").unwrap().into_record();
        c.upsert_slot_game("Alpha", "alpha").unwrap();

        let names: Vec<String> = c
            .list_slot_games()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);

        for (key, cat) in [
            ("storage/library/Zeta/elements/coin.jpg", Category::Elements),
            ("storage/library/Zeta/bg/sky.png", Category::Bg),
            ("storage/library/Zeta/bg/night/aurora.png", Category::Bg),
        ] {
            c.upsert_asset(draft(&zeta.id, key, cat)).unwrap();
        }

        let all = c.list_assets(&zeta.id, None).unwrap();
        let files: Vec<&str> = all.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(files, vec!["aurora.png", "coin.jpg", "sky.png"]);

        let bg = c.list_assets(&zeta.id, Some(Category::Bg)).unwrap();
        assert_eq!(bg.len(), 2);
        assert!(c.list_assets(&zeta.id, Some(Category::Text)).unwrap().is_empty());
        assert!(c.list_assets("unknown-id", None).unwrap().is_empty());
    }

    pub fn prune_keeps_only_seen(c: &mut impl Catalog) {
        let s = c.upsert_slot_game("S", "s").unwrap().into_record();
        let other = c.upsert_slot_game("O", "o").unwrap().into_record();
        let sky = "storage/library/S/bg/sky.png";
        let coin = "storage/library/S/elements/coin.jpg";
        c.upsert_asset(draft(&s.id, sky, Category::Bg)).unwrap();
        c.upsert_asset(draft(&s.id, coin, Category::Elements)).unwrap();
        c.upsert_asset(draft(&other.id, "storage/library/O/bg/o.png", Category::Bg))
            .unwrap();

        let keep: HashSet<String> = [sky.to_string()].into();
        assert_eq!(c.prune_slot_assets(&s.id, &keep).unwrap(), 1);
        assert_eq!(keys(&c.list_assets(&s.id, None).unwrap()), vec![sky]);
        // Other slots untouched
        assert_eq!(c.list_assets(&other.id, None).unwrap().len(), 1);

        assert_eq!(c.prune_slot_assets(&s.id, &keep).unwrap(), 0);
        assert_eq!(c.prune_slot_assets(&s.id, &HashSet::new()).unwrap(), 1);
        assert!(c.list_assets(&s.id, None).unwrap().is_empty());
    }

    pub fn delete_slot_removes_assets_first(c: &mut impl Catalog) {
        let s = c.upsert_slot_game("S", "s").unwrap().into_record();
        c.upsert_asset(draft(&s.id, "storage/library/S/bg/a.png", Category::Bg))
            .unwrap();
        c.upsert_asset(draft(&s.id, "storage/library/S/bg/b.png", Category::Bg))
            .unwrap();

        assert_eq!(c.delete_slot_game(&s.id).unwrap(), 2);
        assert!(c.slot_game_by_slug("s").unwrap().is_none());
        assert!(c.list_assets(&s.id, None).unwrap().is_empty());
        assert!(c.list_slot_games().unwrap().is_empty());

        assert_eq!(c.delete_slot_game(&s.id).unwrap(), 0);

        // The storage key is free again and gets a fresh id.
        let again = c.upsert_slot_game("S", "s").unwrap();
        assert!(matches!(again, Upserted::Created(_)));
        assert_ne!(again.record().id, s.id);
    }

    #[test]
    fn asset_serializes_camel_case() {
        let asset = draft("slot-1", "storage/library/S/bg/sky.png", Category::Bg)
            .into_asset("asset-1".into());
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["slotGameId"], "slot-1");
        assert_eq!(json["storageKey"], "storage/library/S/bg/sky.png");
        assert_eq!(json["mimeType"], "image/png");
        assert_eq!(json["sizeBytes"], 100);
        assert_eq!(json["fileName"], "sky.png");
        assert_eq!(json["category"], "BG");
    }

    #[test]
    fn draft_matches_detects_any_field_change() {
        let d = draft("s", "k/a.png", Category::Bg);
        let asset = d.clone().into_asset("id".into());
        assert!(d.matches(&asset));

        let no_dims = AssetDraft {
            width: None,
            height: None,
            ..d.clone()
        };
        assert!(!no_dims.matches(&asset));

        let recategorized = AssetDraft {
            category: Category::Text,
            ..d
        };
        assert!(!recategorized.matches(&asset));
    }

    #[test]
    fn ids_are_unique_ulids() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(a.parse::<ulid::Ulid>().is_ok());
    }
}
