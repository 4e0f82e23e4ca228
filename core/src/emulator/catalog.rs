//! Built-in emulator catalog and platform mapping maintenance.

use hashbrown::HashMap;
use romshelf_shared::{Emulator, EmulatorCore, EmulatorKind, InstanceOverride, PlatformEmulator};

use super::{EmulatorEngine, EmulatorError};
use crate::store::StoreError;

/// Default runtime for a platform when the user has not picked one.
#[derive(Debug, Clone, Copy)]
pub struct PlatformDefault {
    pub platform: &'static str,
    pub emulator_id: &'static str,
    pub core_id: Option<&'static str>,
}

pub const DEFAULT_PLATFORM_TABLE: &[PlatformDefault] = &[
    PlatformDefault {
        platform: "nes",
        emulator_id: "retroarch",
        core_id: Some("mesen_libretro"),
    },
    PlatformDefault {
        platform: "snes",
        emulator_id: "retroarch",
        core_id: Some("snes9x_libretro"),
    },
    PlatformDefault {
        platform: "wii",
        emulator_id: "dolphin",
        core_id: None,
    },
];

fn flatpak(
    id: &str,
    name: &str,
    flatpak_id: &str,
    template: &str,
    args: &str,
    platforms: &[&str],
) -> Emulator {
    Emulator {
        id: id.to_string(),
        name: name.to_string(),
        kind: EmulatorKind::Flatpak,
        flatpak_id: Some(flatpak_id.to_string()),
        executable: None,
        command_template: template.to_string(),
        default_args: args.to_string(),
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
        available: false,
    }
}

pub fn default_emulators() -> Vec<Emulator> {
    vec![
        // Platforms come from its cores
        flatpak(
            "retroarch",
            "RetroArch",
            "org.libretro.RetroArch",
            "flatpak run {flatpak_id} -L {core_lib_path} {args} {rom}",
            "--fullscreen",
            &[],
        ),
        flatpak(
            "nestopia",
            "Nestopia UE",
            "ca._0ldsk00l.Nestopia",
            "flatpak run {flatpak_id} {args} {rom}",
            "--fullscreen",
            &["nes"],
        ),
        flatpak(
            "dolphin",
            "Dolphin",
            "org.DolphinEmu.dolphin-emu",
            "flatpak run {flatpak_id} {args} {rom}",
            "-b -e",
            &["wii", "gamecube"],
        ),
    ]
}

fn retroarch_core(id: &str, core_id: &str, name: &str, platforms: &[&str]) -> EmulatorCore {
    EmulatorCore {
        id: id.to_string(),
        emulator_id: "retroarch".to_string(),
        name: name.to_string(),
        core_id: core_id.to_string(),
        platforms: platforms.iter().map(|p| p.to_string()).collect(),
        available: false,
    }
}

pub fn default_cores() -> Vec<EmulatorCore> {
    vec![
        retroarch_core("retroarch_mesen", "mesen_libretro", "Mesen", &["nes"]),
        retroarch_core("retroarch_nestopia", "nestopia_libretro", "Nestopia", &["nes"]),
        retroarch_core("retroarch_snes9x", "snes9x_libretro", "Snes9x", &["snes"]),
        retroarch_core("retroarch_bsnes", "bsnes_libretro", "bsnes", &["snes"]),
    ]
}

impl EmulatorEngine {
    /// Seed the built-in catalog and rebuild platform mappings, then apply
    /// the defaults from `[emulators.defaults]`.
    ///
    /// Existing entries keep their last probed availability.
    pub fn initialize(&self) -> Result<(), EmulatorError> {
        for mut emulator in default_emulators() {
            if let Some(existing) = self.store.get_emulator(&emulator.id)? {
                emulator.available = existing.available;
            }
            self.store.upsert_emulator(&emulator)?;
            tracing::debug!("Seeded emulator {}", emulator.id);
        }

        for mut core in default_cores() {
            if let Some(existing) = self.store.get_core(&core.emulator_id, &core.core_id)? {
                core.available = existing.available;
            }
            self.store.upsert_core(&core)?;
            tracing::debug!("Seeded core {}", core.id);
        }

        self.regenerate_mappings()?;
        self.apply_configured_defaults()
    }

    fn apply_configured_defaults(&self) -> Result<(), EmulatorError> {
        for (platform, default) in &self.configured_defaults {
            match self.set_platform_default(platform, &default.emulator, default.core.as_deref()) {
                Ok(()) => {}
                Err(EmulatorError::Store(StoreError::NotFound { .. })) => {
                    tracing::warn!(
                        "Configured default {} for {} has no catalog entry",
                        default.emulator,
                        platform
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Derive platform mappings from every emulator's and core's platform list.
    ///
    /// Priority follows registration order: standalone emulators first, then
    /// cores. Platforms without a default get the built-in one.
    pub fn regenerate_mappings(&self) -> Result<(), EmulatorError> {
        let mut next_priority: HashMap<String, i32> = HashMap::new();
        let mut priority_for = |platform: &str| {
            let slot = next_priority.entry(platform.to_string()).or_insert(0);
            let priority = *slot;
            *slot += 1;
            priority
        };

        for emulator in self.store.list_emulators()? {
            for platform in &emulator.platforms {
                self.store.upsert_platform_emulator(&PlatformEmulator {
                    id: PlatformEmulator::mapping_id(platform, &emulator.id, None),
                    platform: platform.clone(),
                    emulator_id: emulator.id.clone(),
                    core_id: None,
                    priority: priority_for(platform),
                    is_default: false,
                })?;
            }
        }

        for core in self.store.list_cores()? {
            for platform in &core.platforms {
                self.store.upsert_platform_emulator(&PlatformEmulator {
                    id: PlatformEmulator::mapping_id(
                        platform,
                        &core.emulator_id,
                        Some(&core.core_id),
                    ),
                    platform: platform.clone(),
                    emulator_id: core.emulator_id.clone(),
                    core_id: Some(core.core_id.clone()),
                    priority: priority_for(platform),
                    is_default: false,
                })?;
            }
        }

        for default in DEFAULT_PLATFORM_TABLE {
            let mappings = self.store.list_platform_emulators(default.platform)?;
            if mappings.iter().any(|m| m.is_default) {
                continue;
            }
            let id =
                PlatformEmulator::mapping_id(default.platform, default.emulator_id, default.core_id);
            match self.store.set_platform_default(default.platform, &id) {
                Ok(()) => {}
                Err(StoreError::NotFound { .. }) => {
                    tracing::warn!("Default mapping {} has no catalog entry", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("Platform mappings regenerated");
        Ok(())
    }

    /// Make `(emulator, core)` the only default for `platform`.
    pub fn set_platform_default(
        &self,
        platform: &str,
        emulator_id: &str,
        core_id: Option<&str>,
    ) -> Result<(), EmulatorError> {
        let id = PlatformEmulator::mapping_id(platform, emulator_id, core_id);
        self.store.set_platform_default(platform, &id)?;
        tracing::info!("Default emulator for {} is now {}", platform, id);
        Ok(())
    }

    pub fn set_instance_override(&self, ov: &InstanceOverride) -> Result<(), EmulatorError> {
        if let Some(emulator_id) = ov.emulator_id.as_deref()
            && self.store.get_emulator(emulator_id)?.is_none()
        {
            return Err(EmulatorError::UnknownEmulator(emulator_id.to_string()));
        }
        self.store.upsert_instance_override(ov)?;
        tracing::info!(instance_id = %ov.instance_id, "Saved emulator override");
        Ok(())
    }

    pub fn instance_override(
        &self,
        instance_id: &str,
    ) -> Result<Option<InstanceOverride>, EmulatorError> {
        Ok(self.store.get_instance_override(instance_id)?)
    }

    pub fn emulators(&self) -> Result<Vec<Emulator>, EmulatorError> {
        Ok(self.store.list_emulators()?)
    }

    /// Emulators and cores mapped to `platform`, in priority order.
    pub fn emulators_for_platform(
        &self,
        platform: &str,
    ) -> Result<Vec<(PlatformEmulator, Emulator, Option<EmulatorCore>)>, EmulatorError> {
        let mut entries = Vec::new();
        for mapping in self.store.list_platform_emulators(platform)? {
            let Some(emulator) = self.store.get_emulator(&mapping.emulator_id)? else {
                continue;
            };
            let core = match mapping.core_id.as_deref() {
                Some(core_id) => self.store.get_core(&mapping.emulator_id, core_id)?,
                None => None,
            };
            entries.push((mapping, emulator, core));
        }
        Ok(entries)
    }
}
