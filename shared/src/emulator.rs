//! Emulator catalog records.

use serde::{Deserialize, Serialize};

/// How an emulator is installed and invoked on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulatorKind {
    Flatpak,
    Native,
    AppImage,
}

/// A runtime able to run content for one or more platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emulator {
    pub id: String,
    pub name: String,
    pub kind: EmulatorKind,
    /// Package id for flatpak emulators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatpak_id: Option<String>,
    /// Executable name or path for native and appimage emulators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Launch template with `{flatpak_id}`, `{executable}`, `{core_lib_path}`,
    /// `{args}` and `{rom}` placeholders
    pub command_template: String,
    #[serde(default)]
    pub default_args: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Last probed availability
    #[serde(default)]
    pub available: bool,
}

impl Emulator {
    pub fn supports_platform(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p == platform)
    }
}

/// A libretro core owned by an emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorCore {
    pub id: String,
    pub emulator_id: String,
    pub name: String,
    /// File stem of the core library (`<core_id>.so`)
    pub core_id: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub available: bool,
}

impl EmulatorCore {
    pub fn supports_platform(&self, platform: &str) -> bool {
        self.platforms.iter().any(|p| p == platform)
    }
}

/// Platform to emulator (and optional core) mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformEmulator {
    pub id: String,
    pub platform: String,
    pub emulator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_id: Option<String>,
    /// Lower runs first
    pub priority: i32,
    #[serde(default)]
    pub is_default: bool,
}

impl PlatformEmulator {
    /// Mapping id: `<platform>_<emulator>` or `<platform>_<emulator>_<core>`.
    pub fn mapping_id(platform: &str, emulator_id: &str, core_id: Option<&str>) -> String {
        match core_id {
            Some(core) => format!("{platform}_{emulator_id}_{core}"),
            None => format!("{platform}_{emulator_id}"),
        }
    }
}

/// Per-instance choice that supersedes the platform default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceOverride {
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emulator_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_id: Option<String>,
    #[serde(default)]
    pub custom_args: String,
}

/// Result of emulator resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorPair {
    pub emulator: Emulator,
    pub core: Option<EmulatorCore>,
}
