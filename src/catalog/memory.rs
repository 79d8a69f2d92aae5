use super::{
    Asset, AssetDraft, Catalog, CatalogError, SlotGame, Upserted, new_id, sort_assets,
    sort_slot_games,
};
use crate::classify::Category;
use std::collections::{BTreeMap, HashSet};

/// In-memory catalog. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    /// slug → slot game
    slots: BTreeMap<String, SlotGame>,
    /// storage key → asset
    assets: BTreeMap<String, Asset>,
    writes: usize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of record writes and deletes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn asset_by_key(&self, storage_key: &str) -> Option<&Asset> {
        self.assets.get(storage_key)
    }
}

impl Catalog for MemoryCatalog {
    fn upsert_slot_game(
        &mut self,
        name: &str,
        slug: &str,
    ) -> Result<Upserted<SlotGame>, CatalogError> {
        match self.slots.get_mut(slug) {
            Some(existing) if existing.name == name => Ok(Upserted::Unchanged(existing.clone())),
            Some(existing) => {
                existing.name = name.to_string();
                self.writes += 1;
                Ok(Upserted::Updated(existing.clone()))
            }
            None => {
                let slot = SlotGame {
                    id: new_id(),
                    name: name.to_string(),
                    slug: slug.to_string(),
                };
                self.slots.insert(slug.to_string(), slot.clone());
                self.writes += 1;
                Ok(Upserted::Created(slot))
            }
        }
    }

    fn upsert_asset(&mut self, draft: AssetDraft) -> Result<Upserted<Asset>, CatalogError> {
        let key = draft.storage_key.clone();
        let outcome = match self.assets.get(&key) {
            Some(existing) if draft.matches(existing) => {
                return Ok(Upserted::Unchanged(existing.clone()));
            }
            Some(existing) => Upserted::Updated(draft.into_asset(existing.id.clone())),
            None => Upserted::Created(draft.into_asset(new_id())),
        };
        self.assets.insert(key, outcome.record().clone());
        self.writes += 1;
        Ok(outcome)
    }

    fn slot_game_by_slug(&self, slug: &str) -> Result<Option<SlotGame>, CatalogError> {
        Ok(self.slots.get(slug).cloned())
    }

    fn list_slot_games(&self) -> Result<Vec<SlotGame>, CatalogError> {
        let mut slots: Vec<SlotGame> = self.slots.values().cloned().collect();
        sort_slot_games(&mut slots);
        Ok(slots)
    }

    fn list_assets(
        &self,
        slot_game_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<Asset>, CatalogError> {
        let mut assets: Vec<Asset> = self
            .assets
            .values()
            .filter(|a| a.slot_game_id == slot_game_id)
            .filter(|a| category.is_none_or(|c| a.category == c))
            .cloned()
            .collect();
        sort_assets(&mut assets);
        Ok(assets)
    }

    fn prune_slot_assets(
        &mut self,
        slot_game_id: &str,
        keep: &HashSet<String>,
    ) -> Result<usize, CatalogError> {
        let before = self.assets.len();
        self.assets
            .retain(|key, a| a.slot_game_id != slot_game_id || keep.contains(key));
        let removed = before - self.assets.len();
        self.writes += removed;
        Ok(removed)
    }

    fn delete_slot_game(&mut self, slot_game_id: &str) -> Result<usize, CatalogError> {
        let removed = self.prune_slot_assets(slot_game_id, &HashSet::new())?;
        let before = self.slots.len();
        self.slots.retain(|_, s| s.id != slot_game_id);
        self.writes += before - self.slots.len();
        Ok(removed)
    }

    fn flush(&self) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests as shared;

    #[test]
    fn slot_upsert_lifecycle() {
        shared::slot_upsert_lifecycle(&mut MemoryCatalog::new());
    }

    #[test]
    fn asset_upsert_lifecycle() {
        shared::asset_upsert_lifecycle(&mut MemoryCatalog::new());
    }

    #[test]
    fn asset_moving_slot_keeps_id() {
        shared::asset_moving_slot_keeps_id(&mut MemoryCatalog::new());
    }

    #[test]
    fn listing_order_and_filter() {
        shared::listing_order_and_filter(&mut MemoryCatalog::new());
    }

    #[test]
    fn prune_keeps_only_seen() {
        shared::prune_keeps_only_seen(&mut MemoryCatalog::new());
    }

    #[test]
    fn delete_slot_removes_assets_first() {
        shared::delete_slot_removes_assets_first(&mut MemoryCatalog::new());
    }

    #[test]
    fn unchanged_upserts_do_not_count_as_writes() {
        let mut c = MemoryCatalog::new();
        let slot = c.upsert_slot_game("S", "s").unwrap().into_record();
        c.upsert_asset(shared::draft(&slot.id, "k/a.png", Category::Bg))
            .unwrap();
        assert_eq!(c.write_count(), 2);

        c.upsert_slot_game("S", "s").unwrap();
        c.upsert_asset(shared::draft(&slot.id, "k/a.png", Category::Bg))
            .unwrap();
        assert_eq!(c.write_count(), 2);
        assert_eq!(c.asset_count(), 1);
        assert!(c.asset_by_key("k/a.png").is_some());
    }
}
