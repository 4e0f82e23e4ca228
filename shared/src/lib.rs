//! Shared types for the romshelf game library.
//!
//! Plain data only: library records, emulator catalog entries, status payloads
//! and the platform table. Behavior lives in `romshelf-core`.

pub mod emulator;
pub mod events;
pub mod fs;
pub mod ids;
pub mod models;
pub mod platform;

pub use emulator::{
    Emulator, EmulatorCore, EmulatorKind, EmulatorPair, InstanceOverride, PlatformEmulator,
};
pub use events::{
    AvailabilityChange, AvailabilityTarget, LaunchStatus, LaunchStatusUpdate, MetadataStatusUpdate,
};
pub use models::{
    FetchRequest, Game, GameInstance, GameMetadata, MetadataState, MetadataStatus,
    PlatformMetadata, ResolvedMetadata, SOURCE_EMULATED, SOURCE_STEAM,
};
pub use platform::{PLATFORMS, PlatformSpec, platform_by_id};
