//! Emulator catalog, discovery, resolution and command building.
//!
//! [`EmulatorEngine`] owns the moving parts:
//!
//! - catalog seeding and platform mappings (`catalog`)
//! - host probing for installed emulators and cores (`discovery`)
//! - the per-platform availability cache (`availability`)
//! - override -> default -> fallback resolution (`resolve`)
//! - template substitution and tokenization (`command`)

mod availability;
mod catalog;
mod command;
mod discovery;
mod resolve;

pub use availability::AvailabilityCache;
pub use catalog::{DEFAULT_PLATFORM_TABLE, PlatformDefault, default_cores, default_emulators};
pub use command::{build_argv, tokenize};
pub use discovery::{HostProbe, SystemProbe};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{DefaultEmulator, EmulatorsConfig};
use crate::events::EventSink;
use crate::store::{LibraryStore, StoreError};

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("no emulator available for platform {platform}")]
    NoEmulatorAvailable { platform: String },
    #[error("emulator {id} is not available")]
    EmulatorUnavailable { id: String },
    #[error("unknown emulator: {0}")]
    UnknownEmulator(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct EmulatorEngine {
    store: Arc<dyn LibraryStore>,
    sink: Arc<dyn EventSink>,
    probe: Arc<dyn HostProbe>,
    availability: AvailabilityCache,
    flagship_id: String,
    cores_dir: PathBuf,
    configured_defaults: BTreeMap<String, DefaultEmulator>,
}

impl EmulatorEngine {
    pub fn new(
        config: &EmulatorsConfig,
        store: Arc<dyn LibraryStore>,
        sink: Arc<dyn EventSink>,
        probe: Arc<dyn HostProbe>,
    ) -> Self {
        Self {
            store,
            sink,
            probe,
            availability: AvailabilityCache::default(),
            flagship_id: config.flagship_id.clone(),
            cores_dir: config.cores_dir.clone(),
            configured_defaults: config.defaults.clone(),
        }
    }

    pub fn availability(&self) -> &AvailabilityCache {
        &self.availability
    }

    /// Whether any emulator could run content for `platform`, as of the last discovery.
    pub fn is_platform_available(&self, platform: &str) -> bool {
        self.availability.is_available(platform)
    }

    fn core_path(&self, core_id: &str) -> PathBuf {
        self.cores_dir.join(format!("{core_id}.so"))
    }
}
