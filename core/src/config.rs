//! Configuration management (`<config dir>/romshelf/config.toml`)
//!
//! Handles loading, validating, saving, and providing defaults for settings.
//! Every section is optional in the file; missing keys fall back to defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Metadata fetch pool
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Launch and process monitoring timings
    #[serde(default)]
    pub launch: LaunchConfig,
    /// Emulator engine settings
    #[serde(default)]
    pub emulators: EmulatorsConfig,
    /// Game sources
    #[serde(default)]
    pub sources: SourcesConfig,
    /// IGDB credentials
    #[serde(default)]
    pub igdb: IgdbConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Concurrent workers (default: 2)
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Queue capacity (default: 100)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long `queue` waits for a free slot (default: 1000)
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Delay before the liveness probe after spawn (default: 500)
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Activity monitor poll interval (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Undetected time before an activity monitor reports stopped (default: 10000)
    #[serde(default = "default_stop_debounce_ms")]
    pub stop_debounce_ms: u64,
    /// Give up if the game never shows up (default: 120000)
    #[serde(default = "default_detect_timeout_ms")]
    pub detect_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorsConfig {
    /// Emulator that loads libretro cores (default: "retroarch")
    #[serde(default = "default_flagship_id")]
    pub flagship_id: String,
    /// Directory holding `<core_id>.so` files
    #[serde(default = "default_cores_dir")]
    pub cores_dir: PathBuf,
    /// Platform defaults chosen by the user, keyed by platform id.
    /// Applied on every start, after the built-in defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, DefaultEmulator>,
}

/// One `[emulators.defaults.<platform>]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultEmulator {
    pub emulator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub emulated: EmulatedSourceConfig,
    #[serde(default)]
    pub steam: SteamSourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatedSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Root holding one directory per platform (`<roms_dir>/nes/...`)
    #[serde(default = "default_roms_dir")]
    pub roms_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteamSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Steam root; detected from well-known locations when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IgdbConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

fn default_workers() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    100
}
fn default_enqueue_timeout_ms() -> u64 {
    1000
}

fn default_settle_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_stop_debounce_ms() -> u64 {
    10_000
}
fn default_detect_timeout_ms() -> u64 {
    120_000
}

fn default_flagship_id() -> String {
    "retroarch".to_string()
}
fn default_cores_dir() -> PathBuf {
    home_dir()
        .unwrap_or_default()
        .join(".var/app/org.libretro.RetroArch/config/retroarch/cores")
}
fn default_roms_dir() -> PathBuf {
    data_dir().unwrap_or_default().join("roms")
}

fn default_true() -> bool {
    true
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
        }
    }
}

impl FetcherConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stop_debounce_ms: default_stop_debounce_ms(),
            detect_timeout_ms: default_detect_timeout_ms(),
        }
    }
}

impl LaunchConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn stop_debounce(&self) -> Duration {
        Duration::from_millis(self.stop_debounce_ms)
    }
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }
}

impl EmulatorsConfig {
    /// Record `emulator` (and optionally `core`) as the default for `platform`.
    pub fn set_default(&mut self, platform: &str, emulator: &str, core: Option<&str>) {
        self.defaults.insert(
            platform.to_string(),
            DefaultEmulator {
                emulator: emulator.to_string(),
                core: core.map(str::to_string),
            },
        );
    }
}

impl Default for EmulatorsConfig {
    fn default() -> Self {
        Self {
            flagship_id: default_flagship_id(),
            cores_dir: default_cores_dir(),
            defaults: BTreeMap::new(),
        }
    }
}

impl Default for EmulatedSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            roms_dir: default_roms_dir(),
        }
    }
}

impl Default for SteamSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            install_dir: None,
        }
    }
}

impl IgdbConfig {
    /// Credentials from the file, falling back to `IGDB_CLIENT_ID` / `IGDB_CLIENT_SECRET`.
    pub fn credentials(&self) -> Option<(String, String)> {
        let id = self
            .client_id
            .clone()
            .or_else(|| std::env::var("IGDB_CLIENT_ID").ok())
            .filter(|s| !s.is_empty())?;
        let secret = self
            .client_secret
            .clone()
            .or_else(|| std::env::var("IGDB_CLIENT_SECRET").ok())
            .filter(|s| !s.is_empty())?;
        Some((id, secret))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl Config {
    /// Reject values that would stall the pipeline or spin the monitors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero: [(&'static str, u64); 7] = [
            ("fetcher.workers", self.fetcher.workers as u64),
            ("fetcher.queue_capacity", self.fetcher.queue_capacity as u64),
            ("fetcher.enqueue_timeout_ms", self.fetcher.enqueue_timeout_ms),
            ("launch.settle_ms", self.launch.settle_ms),
            ("launch.poll_interval_ms", self.launch.poll_interval_ms),
            ("launch.stop_debounce_ms", self.launch.stop_debounce_ms),
            ("launch.detect_timeout_ms", self.launch.detect_timeout_ms),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero",
                });
            }
        }
        if self.emulators.flagship_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "emulators.flagship_id",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// Load and validate a config file. A missing file yields defaults
    /// which are written back so users have something to edit.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Config::default();
                config.save_to(path)?;
                tracing::info!("Wrote default config to {}", path.display());
                config
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Write the config, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/romshelf`
/// On macOS: `~/Library/Application Support/io.romshelf.romshelf`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "romshelf", "romshelf")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the platform-specific data directory (`~/.local/share/romshelf` on Linux).
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "romshelf", "romshelf")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Default location of `config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Load from the default location, falling back to defaults when no
/// config directory can be determined.
pub fn load() -> Result<Config, ConfigError> {
    match config_path() {
        Some(path) => Config::load_from(&path),
        None => {
            tracing::warn!("No config directory available, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Default value tests
    // =============================================================

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.fetcher.workers, 2);
        assert_eq!(config.fetcher.queue_capacity, 100);
        assert_eq!(config.fetcher.enqueue_timeout(), Duration::from_secs(1));
        assert_eq!(config.launch.settle(), Duration::from_millis(500));
        assert_eq!(config.launch.stop_debounce(), Duration::from_secs(10));
        assert_eq!(config.emulators.flagship_id, "retroarch");
        assert!(config.sources.emulated.enabled);
        assert!(config.validate().is_ok());
    }

    // =============================================================
    // TOML serialization tests
    // =============================================================

    #[test]
    fn test_config_serialize_roundtrip() {
        let mut config = Config::default();
        config.fetcher.workers = 4;
        config.launch.detect_timeout_ms = 30_000;
        config.sources.steam.install_dir = Some(PathBuf::from("/opt/steam"));
        config.igdb.client_id = Some("abc".to_string());

        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
[fetcher]
workers = 8

[sources.emulated]
roms_dir = "/srv/roms"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.fetcher.workers, 8);
        assert_eq!(config.fetcher.queue_capacity, 100); // default
        assert_eq!(config.sources.emulated.roms_dir, PathBuf::from("/srv/roms"));
        assert!(config.sources.emulated.enabled); // default
    }

    #[test]
    fn test_emulator_defaults_table() {
        let toml_str = r#"
[emulators.defaults.nes]
emulator = "retroarch"
core = "mesen_libretro"

[emulators.defaults.gc]
emulator = "dolphin"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.emulators.flagship_id, "retroarch"); // default
        assert_eq!(
            config.emulators.defaults.get("nes"),
            Some(&DefaultEmulator {
                emulator: "retroarch".to_string(),
                core: Some("mesen_libretro".to_string()),
            })
        );
        assert_eq!(config.emulators.defaults["gc"].core, None);
    }

    #[test]
    fn test_default_config_omits_empty_defaults() {
        let toml_str = toml::to_string(&Config::default()).unwrap();
        assert!(!toml_str.contains("defaults"));
    }

    // =============================================================
    // Validation tests
    // =============================================================

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config: Config = toml::from_str("[fetcher]\nworkers = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "fetcher.workers",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.launch.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    // =============================================================
    // File I/O tests
    // =============================================================

    #[test]
    fn test_load_missing_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[test]
    fn test_saved_default_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::load_from(&path).unwrap();

        config.emulators.set_default("snes", "retroarch", Some("bsnes_libretro"));
        config.emulators.set_default("snes", "retroarch", Some("snes9x_libretro"));
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.emulators.defaults.len(), 1);
        assert_eq!(
            reloaded.emulators.defaults["snes"].core.as_deref(),
            Some("snes9x_libretro")
        );
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[fetcher]\nqueue_capacity = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        std::fs::write(&path, "not toml = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
