use super::{
    Asset, AssetDraft, Catalog, CatalogError, SlotGame, Upserted, new_id, sort_assets,
    sort_slot_games,
};
use crate::classify::Category;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::{Db, Tree};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

const SLOT_GAMES_TREE: &str = "slot_games";
const ASSETS_TREE: &str = "assets";
const SLOT_ASSETS_TREE: &str = "slot_assets";

/// Catalog persisted in an embedded sled database.
///
/// Three trees:
///
/// - `slot_games`: slug → JSON [`SlotGame`]
/// - `assets`: storage key → JSON [`Asset`]
/// - `slot_assets`: `<slot id>/<storage key>` → empty, the ownership index
///   that makes per-slot listing and pruning a prefix scan
///
/// The database is flushed explicitly after every pass and once more on drop.
pub struct SledCatalog {
    db: Db,
    slot_games: Tree,
    assets: Tree,
    slot_assets: Tree,
}

impl SledCatalog {
    /// Open or create the catalog directory.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let db = sled::open(path).map_err(|source| CatalogError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "opened catalog");
        Self::from_db(db)
    }

    /// A throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self, CatalogError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, CatalogError> {
        Ok(Self {
            slot_games: db.open_tree(SLOT_GAMES_TREE)?,
            assets: db.open_tree(ASSETS_TREE)?,
            slot_assets: db.open_tree(SLOT_ASSETS_TREE)?,
            db,
        })
    }

    fn index_key(slot_game_id: &str, storage_key: &str) -> String {
        format!("{slot_game_id}/{storage_key}")
    }

    fn index_prefix(slot_game_id: &str) -> String {
        format!("{slot_game_id}/")
    }

    /// Storage keys owned by a slot game, from the ownership index.
    fn owned_keys(&self, slot_game_id: &str) -> Result<Vec<String>, CatalogError> {
        let prefix = Self::index_prefix(slot_game_id);
        let mut keys = Vec::new();
        for item in self.slot_assets.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key);
            if let Some(storage_key) = key.strip_prefix(&prefix) {
                keys.push(storage_key.to_string());
            }
        }
        Ok(keys)
    }

    fn get_asset(&self, storage_key: &str) -> Result<Option<Asset>, CatalogError> {
        self.assets
            .get(storage_key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn remove_asset(&self, slot_game_id: &str, storage_key: &str) -> Result<(), CatalogError> {
        self.assets.remove(storage_key.as_bytes())?;
        self.slot_assets
            .remove(Self::index_key(slot_game_id, storage_key).as_bytes())?;
        Ok(())
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, CatalogError> {
    Ok(serde_json::to_vec(record)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CatalogError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl Catalog for SledCatalog {
    fn upsert_slot_game(
        &mut self,
        name: &str,
        slug: &str,
    ) -> Result<Upserted<SlotGame>, CatalogError> {
        let existing: Option<SlotGame> = self
            .slot_games
            .get(slug.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()?;

        let outcome = match existing {
            Some(slot) if slot.name == name => return Ok(Upserted::Unchanged(slot)),
            Some(slot) => Upserted::Updated(SlotGame {
                name: name.to_string(),
                ..slot
            }),
            None => Upserted::Created(SlotGame {
                id: new_id(),
                name: name.to_string(),
                slug: slug.to_string(),
            }),
        };
        self.slot_games
            .insert(slug.as_bytes(), encode(outcome.record())?)?;
        Ok(outcome)
    }

    fn upsert_asset(&mut self, draft: AssetDraft) -> Result<Upserted<Asset>, CatalogError> {
        let outcome = match self.get_asset(&draft.storage_key)? {
            Some(existing) if draft.matches(&existing) => {
                return Ok(Upserted::Unchanged(existing));
            }
            Some(existing) => {
                if existing.slot_game_id != draft.slot_game_id {
                    self.slot_assets.remove(
                        Self::index_key(&existing.slot_game_id, &existing.storage_key).as_bytes(),
                    )?;
                }
                Upserted::Updated(draft.into_asset(existing.id))
            }
            None => Upserted::Created(draft.into_asset(new_id())),
        };

        let asset = outcome.record();
        self.assets
            .insert(asset.storage_key.as_bytes(), encode(asset)?)?;
        self.slot_assets.insert(
            Self::index_key(&asset.slot_game_id, &asset.storage_key).as_bytes(),
            &[] as &[u8],
        )?;
        Ok(outcome)
    }

    fn slot_game_by_slug(&self, slug: &str) -> Result<Option<SlotGame>, CatalogError> {
        self.slot_games
            .get(slug.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_slot_games(&self) -> Result<Vec<SlotGame>, CatalogError> {
        let mut slots = Vec::new();
        for item in self.slot_games.iter() {
            let (_, value) = item?;
            slots.push(decode::<SlotGame>(&value)?);
        }
        sort_slot_games(&mut slots);
        Ok(slots)
    }

    fn list_assets(
        &self,
        slot_game_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<Asset>, CatalogError> {
        let mut assets = Vec::new();
        for storage_key in self.owned_keys(slot_game_id)? {
            match self.get_asset(&storage_key)? {
                Some(asset) if category.is_none_or(|c| asset.category == c) => assets.push(asset),
                Some(_) => {}
                None => warn!(storage_key, "ownership index points at a missing asset"),
            }
        }
        sort_assets(&mut assets);
        Ok(assets)
    }

    fn prune_slot_assets(
        &mut self,
        slot_game_id: &str,
        keep: &HashSet<String>,
    ) -> Result<usize, CatalogError> {
        let mut removed = 0;
        for storage_key in self.owned_keys(slot_game_id)? {
            if !keep.contains(&storage_key) {
                self.remove_asset(slot_game_id, &storage_key)?;
                debug!(storage_key, "pruned asset");
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn delete_slot_game(&mut self, slot_game_id: &str) -> Result<usize, CatalogError> {
        let removed = self.prune_slot_assets(slot_game_id, &HashSet::new())?;

        let mut slugs = Vec::new();
        for item in self.slot_games.iter() {
            let (slug, value) = item?;
            if decode::<SlotGame>(&value)?.id == slot_game_id {
                slugs.push(slug);
            }
        }
        for slug in slugs {
            self.slot_games.remove(slug)?;
        }
        Ok(removed)
    }

    fn flush(&self) -> Result<(), CatalogError> {
        self.db.flush()?;
        Ok(())
    }
}

impl Drop for SledCatalog {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "failed to flush catalog on close");
        }
    }
}
