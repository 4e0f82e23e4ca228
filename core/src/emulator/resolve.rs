//! Picks the emulator (and core) for a title.
//!
//! Strict order, first match wins:
//! 1. the instance override, if its emulator and core are available
//! 2. the platform default, if available
//! 3. any available mapping for the platform, by priority

use romshelf_shared::EmulatorPair;

use super::{EmulatorEngine, EmulatorError};

impl EmulatorEngine {
    pub fn resolve(
        &self,
        platform: &str,
        instance_id: Option<&str>,
    ) -> Result<EmulatorPair, EmulatorError> {
        if let Some(instance_id) = instance_id
            && let Some(ov) = self.store.get_instance_override(instance_id)?
            && let Some(emulator_id) = ov.emulator_id.as_deref()
        {
            match self.available_pair(emulator_id, ov.core_id.as_deref())? {
                Some(pair) => {
                    tracing::debug!(instance_id = %instance_id, "Using emulator override {}", emulator_id);
                    return Ok(pair);
                }
                None => tracing::warn!(
                    instance_id = %instance_id,
                    "Override emulator {} unavailable, falling back",
                    emulator_id
                ),
            }
        }

        let mappings = self.store.list_platform_emulators(platform)?;

        if let Some(default) = mappings.iter().find(|m| m.is_default)
            && let Some(pair) =
                self.available_pair(&default.emulator_id, default.core_id.as_deref())?
        {
            return Ok(pair);
        }

        for mapping in &mappings {
            if let Some(pair) =
                self.available_pair(&mapping.emulator_id, mapping.core_id.as_deref())?
            {
                tracing::debug!("Falling back to {} for {}", mapping.id, platform);
                return Ok(pair);
            }
        }

        Err(EmulatorError::NoEmulatorAvailable {
            platform: platform.to_string(),
        })
    }

    /// The pair if the emulator and, when named, the core are both available.
    fn available_pair(
        &self,
        emulator_id: &str,
        core_id: Option<&str>,
    ) -> Result<Option<EmulatorPair>, EmulatorError> {
        let Some(emulator) = self.store.get_emulator(emulator_id)? else {
            return Ok(None);
        };
        if !emulator.available {
            return Ok(None);
        }
        let core = match core_id {
            None => None,
            Some(core_id) => match self.store.get_core(emulator_id, core_id)? {
                Some(core) if core.available => Some(core),
                _ => return Ok(None),
            },
        };
        Ok(Some(EmulatorPair { emulator, core }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibraryStore;
    use crate::test_utils::engine_fixture;
    use romshelf_shared::InstanceOverride;

    fn set_available(fixture: &crate::test_utils::EngineFixture, emulator: &str, up: bool) {
        fixture.store.set_emulator_available(emulator, up).unwrap();
    }

    #[test]
    fn test_unavailable_override_falls_back_to_default() {
        let fixture = engine_fixture();
        fixture.engine.initialize().unwrap();
        set_available(&fixture, "retroarch", true);
        fixture
            .store
            .set_core_available("retroarch_mesen", true)
            .unwrap();
        fixture
            .store
            .upsert_instance_override(&InstanceOverride {
                instance_id: "file_1".to_string(),
                emulator_id: Some("nestopia".to_string()),
                ..Default::default()
            })
            .unwrap();

        let pair = fixture.engine.resolve("nes", Some("file_1")).unwrap();
        assert_eq!(pair.emulator.id, "retroarch");
        assert_eq!(pair.core.unwrap().core_id, "mesen_libretro");
    }

    #[test]
    fn test_available_override_wins() {
        let fixture = engine_fixture();
        fixture.engine.initialize().unwrap();
        set_available(&fixture, "retroarch", true);
        set_available(&fixture, "nestopia", true);
        fixture
            .store
            .set_core_available("retroarch_mesen", true)
            .unwrap();
        fixture
            .store
            .upsert_instance_override(&InstanceOverride {
                instance_id: "file_1".to_string(),
                emulator_id: Some("nestopia".to_string()),
                ..Default::default()
            })
            .unwrap();

        let pair = fixture.engine.resolve("nes", Some("file_1")).unwrap();
        assert_eq!(pair.emulator.id, "nestopia");
        assert!(pair.core.is_none());

        // Other instances still get the default
        let pair = fixture.engine.resolve("nes", Some("file_2")).unwrap();
        assert_eq!(pair.emulator.id, "retroarch");
    }

    #[test]
    fn test_override_with_missing_core_falls_through() {
        let fixture = engine_fixture();
        fixture.engine.initialize().unwrap();
        set_available(&fixture, "retroarch", true);
        set_available(&fixture, "nestopia", true);
        fixture
            .store
            .upsert_instance_override(&InstanceOverride {
                instance_id: "file_1".to_string(),
                emulator_id: Some("retroarch".to_string()),
                core_id: Some("nestopia_libretro".to_string()),
                ..Default::default()
            })
            .unwrap();

        let pair = fixture.engine.resolve("nes", Some("file_1")).unwrap();
        assert_eq!(pair.emulator.id, "nestopia");
    }

    #[test]
    fn test_single_available_fallback_is_used() {
        let fixture = engine_fixture();
        fixture.engine.initialize().unwrap();
        // Default (retroarch + mesen) is down, bsnes isn't mapped to nes
        set_available(&fixture, "retroarch", true);
        fixture
            .store
            .set_core_available("retroarch_nestopia", true)
            .unwrap();

        let pair = fixture.engine.resolve("nes", None).unwrap();
        assert_eq!(pair.emulator.id, "retroarch");
        assert_eq!(pair.core.unwrap().id, "retroarch_nestopia");
    }

    #[test]
    fn test_fallback_honors_priority() {
        let fixture = engine_fixture();
        fixture.engine.initialize().unwrap();
        set_available(&fixture, "retroarch", true);
        set_available(&fixture, "nestopia", true);
        fixture
            .store
            .set_core_available("retroarch_nestopia", true)
            .unwrap();

        // nes_nestopia was registered first
        let pair = fixture.engine.resolve("nes", None).unwrap();
        assert_eq!(pair.emulator.id, "nestopia");
    }

    #[test]
    fn test_nothing_available_names_platform() {
        let fixture = engine_fixture();
        fixture.engine.initialize().unwrap();

        let err = fixture.engine.resolve("snes", None).unwrap_err();
        assert!(
            matches!(&err, EmulatorError::NoEmulatorAvailable { platform } if platform == "snes")
        );
        assert!(err.to_string().contains("snes"));

        // Unmapped platforms fail the same way
        assert!(matches!(
            fixture.engine.resolve("n64", None),
            Err(EmulatorError::NoEmulatorAvailable { .. })
        ));
    }
}
