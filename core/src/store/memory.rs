//! In-memory [`LibraryStore`].

use std::sync::RwLock;

use hashbrown::HashMap;
use romshelf_shared::{
    Emulator, EmulatorCore, Game, GameInstance, InstanceOverride, MetadataStatus,
    PlatformEmulator, ResolvedMetadata,
};

use super::{LibraryStore, StoreError, StoreResult};
use crate::sync::{read, write};

#[derive(Default)]
struct Tables {
    games: HashMap<String, Game>,
    instances: HashMap<String, GameInstance>,
    /// game id -> (resolver, snapshot)
    external: HashMap<String, (String, ResolvedMetadata)>,
    emulators: Vec<Emulator>,
    cores: Vec<EmulatorCore>,
    mappings: Vec<PlatformEmulator>,
    overrides: HashMap<String, InstanceOverride>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Replace the entry with the same key or append.
fn upsert_by<T: Clone>(items: &mut Vec<T>, item: &T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item.clone(),
        None => items.push(item.clone()),
    }
}

impl LibraryStore for MemoryStore {
    fn get_game(&self, id: &str) -> StoreResult<Option<Game>> {
        Ok(read(&self.tables).games.get(id).cloned())
    }

    fn upsert_game(&self, game: &Game) -> StoreResult<()> {
        write(&self.tables)
            .games
            .insert(game.id.clone(), game.clone());
        Ok(())
    }

    fn list_games(&self) -> StoreResult<Vec<Game>> {
        let mut games: Vec<Game> = read(&self.tables).games.values().cloned().collect();
        games.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(games)
    }

    fn get_instance(&self, id: &str) -> StoreResult<Option<GameInstance>> {
        Ok(read(&self.tables).instances.get(id).cloned())
    }

    fn upsert_instance(&self, instance: &GameInstance) -> StoreResult<()> {
        write(&self.tables)
            .instances
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    fn list_instances(&self) -> StoreResult<Vec<GameInstance>> {
        let mut instances: Vec<GameInstance> =
            read(&self.tables).instances.values().cloned().collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    fn set_metadata_status(&self, instance_id: &str, status: &MetadataStatus) -> StoreResult<()> {
        let mut tables = write(&self.tables);
        let instance = tables
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| not_found("instance", instance_id))?;
        instance.metadata_status = status.clone();
        Ok(())
    }

    fn cached_metadata(&self, game_id: &str) -> StoreResult<Option<(String, ResolvedMetadata)>> {
        Ok(read(&self.tables).external.get(game_id).cloned())
    }

    fn cache_metadata(
        &self,
        game_id: &str,
        resolver: &str,
        metadata: &ResolvedMetadata,
    ) -> StoreResult<()> {
        write(&self.tables).external.insert(
            game_id.to_string(),
            (resolver.to_string(), metadata.clone()),
        );
        Ok(())
    }

    fn list_emulators(&self) -> StoreResult<Vec<Emulator>> {
        Ok(read(&self.tables).emulators.clone())
    }

    fn get_emulator(&self, id: &str) -> StoreResult<Option<Emulator>> {
        Ok(read(&self.tables)
            .emulators
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    fn upsert_emulator(&self, emulator: &Emulator) -> StoreResult<()> {
        upsert_by(&mut write(&self.tables).emulators, emulator, |e| {
            e.id == emulator.id
        });
        Ok(())
    }

    fn set_emulator_available(&self, id: &str, available: bool) -> StoreResult<()> {
        let mut tables = write(&self.tables);
        let emulator = tables
            .emulators
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| not_found("emulator", id))?;
        emulator.available = available;
        Ok(())
    }

    fn list_cores(&self) -> StoreResult<Vec<EmulatorCore>> {
        Ok(read(&self.tables).cores.clone())
    }

    fn get_core(&self, emulator_id: &str, core_id: &str) -> StoreResult<Option<EmulatorCore>> {
        Ok(read(&self.tables)
            .cores
            .iter()
            .find(|c| c.emulator_id == emulator_id && c.core_id == core_id)
            .cloned())
    }

    fn upsert_core(&self, core: &EmulatorCore) -> StoreResult<()> {
        upsert_by(&mut write(&self.tables).cores, core, |c| c.id == core.id);
        Ok(())
    }

    fn set_core_available(&self, id: &str, available: bool) -> StoreResult<()> {
        let mut tables = write(&self.tables);
        let core = tables
            .cores
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| not_found("core", id))?;
        core.available = available;
        Ok(())
    }

    fn list_platform_emulators(&self, platform: &str) -> StoreResult<Vec<PlatformEmulator>> {
        let mut mappings: Vec<PlatformEmulator> = read(&self.tables)
            .mappings
            .iter()
            .filter(|m| m.platform == platform)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal priorities
        mappings.sort_by_key(|m| m.priority);
        Ok(mappings)
    }

    fn list_platforms(&self) -> StoreResult<Vec<String>> {
        let tables = read(&self.tables);
        let mut platforms: Vec<String> = Vec::new();
        for mapping in &tables.mappings {
            if !platforms.contains(&mapping.platform) {
                platforms.push(mapping.platform.clone());
            }
        }
        Ok(platforms)
    }

    fn upsert_platform_emulator(&self, mapping: &PlatformEmulator) -> StoreResult<()> {
        let mut tables = write(&self.tables);
        match tables.mappings.iter_mut().find(|m| m.id == mapping.id) {
            Some(existing) => {
                let is_default = existing.is_default;
                *existing = mapping.clone();
                existing.is_default = is_default;
            }
            None => tables.mappings.push(mapping.clone()),
        }
        Ok(())
    }

    fn set_platform_default(&self, platform: &str, mapping_id: &str) -> StoreResult<()> {
        let mut tables = write(&self.tables);
        if !tables
            .mappings
            .iter()
            .any(|m| m.id == mapping_id && m.platform == platform)
        {
            return Err(not_found("platform mapping", mapping_id));
        }
        for mapping in tables.mappings.iter_mut().filter(|m| m.platform == platform) {
            mapping.is_default = mapping.id == mapping_id;
        }
        Ok(())
    }

    fn get_instance_override(&self, instance_id: &str) -> StoreResult<Option<InstanceOverride>> {
        Ok(read(&self.tables).overrides.get(instance_id).cloned())
    }

    fn upsert_instance_override(&self, ov: &InstanceOverride) -> StoreResult<()> {
        write(&self.tables)
            .overrides
            .insert(ov.instance_id.clone(), ov.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(id: &str, platform: &str, priority: i32) -> PlatformEmulator {
        PlatformEmulator {
            id: id.to_string(),
            platform: platform.to_string(),
            emulator_id: id.to_string(),
            core_id: None,
            priority,
            is_default: false,
        }
    }

    #[test]
    fn test_mappings_sorted_by_priority_then_insertion() {
        let store = MemoryStore::new();
        store.upsert_platform_emulator(&mapping("b", "nes", 1)).unwrap();
        store.upsert_platform_emulator(&mapping("a", "nes", 0)).unwrap();
        store.upsert_platform_emulator(&mapping("c", "nes", 1)).unwrap();
        store.upsert_platform_emulator(&mapping("x", "snes", 0)).unwrap();

        let ids: Vec<String> = store
            .list_platform_emulators("nes")
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.list_platforms().unwrap(), vec!["nes", "snes"]);
    }

    #[test]
    fn test_set_platform_default_is_exclusive() {
        let store = MemoryStore::new();
        store.upsert_platform_emulator(&mapping("a", "nes", 0)).unwrap();
        store.upsert_platform_emulator(&mapping("b", "nes", 1)).unwrap();

        store.set_platform_default("nes", "a").unwrap();
        store.set_platform_default("nes", "b").unwrap();

        let defaults: Vec<String> = store
            .list_platform_emulators("nes")
            .unwrap()
            .into_iter()
            .filter(|m| m.is_default)
            .map(|m| m.id)
            .collect();
        assert_eq!(defaults, vec!["b"]);
    }

    #[test]
    fn test_upsert_mapping_keeps_default_flag() {
        let store = MemoryStore::new();
        store.upsert_platform_emulator(&mapping("a", "nes", 0)).unwrap();
        store.set_platform_default("nes", "a").unwrap();
        store.upsert_platform_emulator(&mapping("a", "nes", 3)).unwrap();

        let mappings = store.list_platform_emulators("nes").unwrap();
        assert!(mappings[0].is_default);
        assert_eq!(mappings[0].priority, 3);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set_emulator_available("ghost", true),
            Err(StoreError::NotFound { kind: "emulator", .. })
        ));
        assert!(store.set_platform_default("nes", "ghost").is_err());
        assert!(
            store
                .set_metadata_status("ghost", &MetadataStatus::default())
                .is_err()
        );
    }
}
