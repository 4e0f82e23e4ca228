//! Persistence interface.
//!
//! The schema and on-disk format belong to the host application. The engine
//! only needs these synchronous reads and writes; [`MemoryStore`] backs the
//! CLI and tests.

mod memory;

pub use memory::MemoryStore;

use romshelf_shared::{
    Emulator, EmulatorCore, Game, GameInstance, InstanceOverride, MetadataStatus,
    PlatformEmulator, ResolvedMetadata,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait LibraryStore: Send + Sync {
    // Games
    fn get_game(&self, id: &str) -> StoreResult<Option<Game>>;
    fn upsert_game(&self, game: &Game) -> StoreResult<()>;
    fn list_games(&self) -> StoreResult<Vec<Game>>;

    // Instances
    fn get_instance(&self, id: &str) -> StoreResult<Option<GameInstance>>;
    fn upsert_instance(&self, instance: &GameInstance) -> StoreResult<()>;
    fn list_instances(&self) -> StoreResult<Vec<GameInstance>>;
    fn set_metadata_status(&self, instance_id: &str, status: &MetadataStatus) -> StoreResult<()>;

    // External metadata cache, keyed by game id and resolver name

    /// Any cached snapshot for the game, with the resolver that produced it.
    fn cached_metadata(&self, game_id: &str) -> StoreResult<Option<(String, ResolvedMetadata)>>;
    fn cache_metadata(
        &self,
        game_id: &str,
        resolver: &str,
        metadata: &ResolvedMetadata,
    ) -> StoreResult<()>;

    // Emulators and cores, listed in insertion order
    fn list_emulators(&self) -> StoreResult<Vec<Emulator>>;
    fn get_emulator(&self, id: &str) -> StoreResult<Option<Emulator>>;
    fn upsert_emulator(&self, emulator: &Emulator) -> StoreResult<()>;
    fn set_emulator_available(&self, id: &str, available: bool) -> StoreResult<()>;

    fn list_cores(&self) -> StoreResult<Vec<EmulatorCore>>;
    /// Core owned by `emulator_id` whose library stem is `core_id`.
    fn get_core(&self, emulator_id: &str, core_id: &str) -> StoreResult<Option<EmulatorCore>>;
    fn upsert_core(&self, core: &EmulatorCore) -> StoreResult<()>;
    fn set_core_available(&self, id: &str, available: bool) -> StoreResult<()>;

    // Platform mappings

    /// Mappings for a platform ordered by priority, ties in insertion order.
    fn list_platform_emulators(&self, platform: &str) -> StoreResult<Vec<PlatformEmulator>>;
    /// Every platform that has at least one mapping.
    fn list_platforms(&self) -> StoreResult<Vec<String>>;
    /// Insert or update a mapping. An existing mapping keeps its default flag.
    fn upsert_platform_emulator(&self, mapping: &PlatformEmulator) -> StoreResult<()>;
    /// Make `mapping_id` the only default for `platform`.
    fn set_platform_default(&self, platform: &str, mapping_id: &str) -> StoreResult<()>;

    // Per-instance overrides
    fn get_instance_override(&self, instance_id: &str) -> StoreResult<Option<InstanceOverride>>;
    fn upsert_instance_override(&self, ov: &InstanceOverride) -> StoreResult<()>;
}
