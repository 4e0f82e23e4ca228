//! Installed Steam games.
//!
//! Instances come from `steamapps/appmanifest_*.acf`. Launching goes through
//! the `steam://` protocol handler, so the game is tracked by watching for
//! processes under its install directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use romshelf_core::config::home_dir;
use romshelf_core::launch::{GameSource, LaunchError, LaunchedProcess, MonitorStrategy};
use romshelf_shared::ids::{is_safe_path_component, steam_game_id, steam_instance_id};
use romshelf_shared::{GameInstance, SOURCE_STEAM};

/// Present in the install directory of Proton, runtimes and other tools.
const TOOL_MANIFEST: &str = "toolmanifest.vdf";

/// The handful of `AppState` keys we need from an app manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppManifest {
    pub app_id: String,
    pub name: String,
    pub install_dir: String,
    pub size_on_disk: u64,
}

/// Read top-level `"key" "value"` pairs from an app manifest.
///
/// Only the flat keys are read; nested sections are skipped. The first
/// occurrence of a key wins so values inside later sections never shadow
/// the real ones.
pub fn parse_app_manifest(text: &str) -> Option<AppManifest> {
    let mut manifest = AppManifest::default();
    let mut depth = 0usize;

    for line in text.lines() {
        let line = line.trim();
        match line {
            "{" => {
                depth += 1;
                continue;
            }
            "}" => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if depth != 1 {
            continue;
        }
        let mut parts = quoted_strings(line);
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let slot = match key.to_ascii_lowercase().as_str() {
            "appid" => &mut manifest.app_id,
            "name" => &mut manifest.name,
            "installdir" => &mut manifest.install_dir,
            "sizeondisk" => {
                if manifest.size_on_disk == 0 {
                    manifest.size_on_disk = value.parse().unwrap_or(0);
                }
                continue;
            }
            _ => continue,
        };
        if slot.is_empty() {
            *slot = value.to_string();
        }
    }

    (!manifest.app_id.is_empty()).then_some(manifest)
}

/// The double-quoted strings on one line.
fn quoted_strings(line: &str) -> impl Iterator<Item = &str> {
    line.split('"').skip(1).step_by(2)
}

fn is_app_manifest(filename: &str) -> bool {
    filename.starts_with("appmanifest_") && filename.ends_with(".acf")
}

/// Install directories Steam commonly uses on this host, most likely first.
pub fn candidate_install_dirs(home: &Path) -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![home.join("Library/Application Support/Steam")]
    } else {
        vec![
            home.join(".local/share/Steam"),
            home.join(".steam/steam"),
            home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam"),
        ]
    }
}

pub fn detect_install_dir() -> Option<PathBuf> {
    let home = home_dir()?;
    candidate_install_dirs(&home)
        .into_iter()
        .find(|dir| dir.join("steamapps").is_dir())
}

pub struct SteamSource {
    install_dir: Option<PathBuf>,
}

impl SteamSource {
    /// `install_dir` overrides detection.
    pub fn new(install_dir: Option<PathBuf>) -> Self {
        let install_dir = install_dir.or_else(detect_install_dir);
        match &install_dir {
            Some(dir) => tracing::info!("Using Steam install at {}", dir.display()),
            None => tracing::info!("Steam install not found"),
        }
        Self { install_dir }
    }

    pub fn install_dir(&self) -> Option<&Path> {
        self.install_dir.as_deref()
    }
}

/// Scan a `steamapps` directory. Broken manifests and tools are skipped.
pub fn scan_steamapps(steamapps: &Path) -> Result<Vec<GameInstance>> {
    if !steamapps.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(steamapps)
        .with_context(|| format!("Failed to read {}", steamapps.display()))?;

    let mut instances = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", steamapps.display()))?;
        let filename = entry.file_name();
        let Some(filename) = filename.to_str() else {
            continue;
        };
        if !is_app_manifest(filename) || !entry.path().is_file() {
            continue;
        }

        let text = match std::fs::read_to_string(entry.path()) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", filename, e);
                continue;
            }
        };
        let Some(manifest) = parse_app_manifest(&text) else {
            tracing::warn!("No appid in {}", filename);
            continue;
        };
        if !is_safe_path_component(&manifest.install_dir) {
            tracing::warn!(
                "Ignoring {}: unusable installdir {:?}",
                filename,
                manifest.install_dir
            );
            continue;
        }

        let install_path = steamapps.join("common").join(&manifest.install_dir);
        if install_path.join(TOOL_MANIFEST).is_file() {
            tracing::debug!("Skipping Steam tool {} ({})", manifest.name, manifest.app_id);
            continue;
        }

        instances.push(steam_instance(manifest, install_path));
    }
    Ok(instances)
}

fn steam_instance(manifest: AppManifest, install_path: PathBuf) -> GameInstance {
    let display_name = if manifest.name.is_empty() {
        manifest.install_dir.clone()
    } else {
        manifest.name.clone()
    };
    let mut instance = GameInstance::new(
        steam_instance_id(&manifest.app_id),
        steam_game_id(&manifest.app_id),
        SOURCE_STEAM,
        SOURCE_STEAM,
        manifest.app_id,
        display_name,
    );
    instance.filename = manifest.install_dir;
    instance.file_size = manifest.size_on_disk;
    instance.install_path = Some(install_path);
    instance
}

#[async_trait]
impl GameSource for SteamSource {
    fn name(&self) -> &str {
        SOURCE_STEAM
    }

    async fn scan(&self) -> Result<Vec<GameInstance>> {
        let Some(install_dir) = self.install_dir.clone() else {
            return Ok(Vec::new());
        };
        let steamapps = install_dir.join("steamapps");
        let instances = tokio::task::spawn_blocking(move || scan_steamapps(&steamapps))
            .await
            .context("Steam scan task failed")??;
        tracing::info!("Found {} Steam games", instances.len());
        Ok(instances)
    }

    async fn launch(&self, instance: &GameInstance) -> Result<LaunchedProcess, LaunchError> {
        let url = format!("steam://rungameid/{}", instance.source_id);
        tracing::info!(instance_id = %instance.id, "Opening {}", url);
        open::that_detached(&url).with_context(|| format!("Failed to open {}", url))?;
        Ok(LaunchedProcess::Detached)
    }

    fn monitor_strategy(&self, instance: &GameInstance) -> MonitorStrategy {
        let install_path = instance.install_path.clone().unwrap_or_else(|| {
            self.install_dir
                .clone()
                .unwrap_or_default()
                .join("steamapps/common")
                .join(&instance.filename)
        });
        MonitorStrategy::Activity { install_path }
    }
}
