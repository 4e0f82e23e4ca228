//! Probing the host for installed emulators and cores.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use hashbrown::HashMap;
use romshelf_shared::{AvailabilityChange, AvailabilityTarget, Emulator, EmulatorKind};
use tokio::process::Command;

use super::{EmulatorEngine, EmulatorError};

/// Questions discovery asks about the host.
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// `flatpak info <id>` succeeds.
    async fn flatpak_installed(&self, flatpak_id: &str) -> bool;

    /// The executable resolves on `PATH` (or is an absolute executable path).
    fn executable_on_path(&self, name: &str) -> bool;

    fn file_exists(&self, path: &Path) -> bool;
}

/// Probes the real machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

#[async_trait]
impl HostProbe for SystemProbe {
    async fn flatpak_installed(&self, flatpak_id: &str) -> bool {
        let status = Command::new("flatpak")
            .arg("info")
            .arg(flatpak_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::debug!("flatpak unavailable while probing {}: {}", flatpak_id, e);
                false
            }
        }
    }

    fn executable_on_path(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

impl EmulatorEngine {
    async fn probe_emulator(&self, emulator: &Emulator) -> bool {
        match emulator.kind {
            EmulatorKind::Flatpak => match emulator.flatpak_id.as_deref() {
                Some(id) => self.probe.flatpak_installed(id).await,
                None => false,
            },
            EmulatorKind::Native => emulator
                .executable
                .as_deref()
                .is_some_and(|exe| self.probe.executable_on_path(exe)),
            EmulatorKind::AppImage => emulator
                .executable
                .as_deref()
                .is_some_and(|exe| self.probe.file_exists(Path::new(exe))),
        }
    }

    /// Re-probe every emulator and core, persist flips, emit a change per
    /// flip and rebuild the platform availability cache.
    ///
    /// A core is available only when its emulator is and its library file
    /// exists under the cores directory.
    pub async fn discover(&self) -> Result<(), EmulatorError> {
        let mut emulator_up: HashMap<String, bool> = HashMap::new();

        for emulator in self.store.list_emulators()? {
            let available = self.probe_emulator(&emulator).await;
            emulator_up.insert(emulator.id.clone(), available);
            if available != emulator.available {
                self.store.set_emulator_available(&emulator.id, available)?;
                tracing::info!("Emulator {} available: {}", emulator.id, available);
                self.sink.emulator_availability_changed(AvailabilityChange {
                    target: AvailabilityTarget::Emulator,
                    id: emulator.id.clone(),
                    available,
                });
            }
        }

        for core in self.store.list_cores()? {
            let owner_up = emulator_up.get(&core.emulator_id).copied().unwrap_or(false);
            let available = owner_up && self.probe.file_exists(&self.core_path(&core.core_id));
            if available != core.available {
                self.store.set_core_available(&core.id, available)?;
                tracing::info!("Core {} available: {}", core.id, available);
                self.sink.emulator_availability_changed(AvailabilityChange {
                    target: AvailabilityTarget::Core,
                    id: core.id.clone(),
                    available,
                });
            }
        }

        self.refresh_availability()
    }

    /// Recompute the per-platform cache from stored flags.
    pub fn refresh_availability(&self) -> Result<(), EmulatorError> {
        let mut table = HashMap::new();
        for platform in self.store.list_platforms()? {
            let available = match self.resolve(&platform, None) {
                Ok(_) => true,
                Err(EmulatorError::NoEmulatorAvailable { .. }) => false,
                Err(e) => return Err(e),
            };
            table.insert(platform, available);
        }
        self.availability.replace(table);
        Ok(())
    }
}
