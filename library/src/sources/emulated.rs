//! Locally stored ROMs, run through an emulator.
//!
//! ROMs live under `<roms dir>/<platform>/`, any depth. A file belongs to a
//! platform when its extension is one the platform table lists.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use romshelf_core::emulator::EmulatorEngine;
use romshelf_core::launch::{
    GameSource, LaunchError, LaunchedProcess, MonitorStrategy, spawn_checked,
};
use romshelf_shared::fs::hash_file_prefix;
use romshelf_shared::ids::{display_name_from_filename, emulated_game_id, file_instance_id};
use romshelf_shared::{GameInstance, PLATFORMS, PlatformSpec, SOURCE_EMULATED, platform_by_id};
use walkdir::WalkDir;

pub struct EmulatedSource {
    roms_dir: PathBuf,
    engine: Arc<EmulatorEngine>,
    settle: Duration,
}

impl EmulatedSource {
    pub fn new(roms_dir: PathBuf, engine: Arc<EmulatorEngine>, settle: Duration) -> Self {
        Self {
            roms_dir,
            engine,
            settle,
        }
    }

    pub fn roms_dir(&self) -> &Path {
        &self.roms_dir
    }

    /// Build an instance for a ROM outside the standard layout.
    pub fn add_rom(&self, path: &Path, platform: &str) -> Result<GameInstance> {
        let Some(spec) = platform_by_id(platform).filter(|p| !p.extensions.is_empty()) else {
            bail!("Unknown platform: {}", platform);
        };
        if !path.is_file() {
            bail!("ROM not found: {}", path.display());
        }
        if !is_rom_file(path, spec) {
            bail!("{} is not a valid ROM for platform {}", path.display(), platform);
        }
        let mut instance = rom_instance(path, spec.id)?;
        self.mark_availability(&mut instance);
        Ok(instance)
    }

    fn mark_availability(&self, instance: &mut GameInstance) {
        instance.emulator_available = Some(self.engine.is_platform_available(&instance.platform));
    }
}

fn is_rom_file(path: &Path, spec: &PlatformSpec) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| spec.matches_extension(ext))
}

fn rom_instance(path: &Path, platform: &str) -> Result<GameInstance> {
    let file_size = path
        .metadata()
        .with_context(|| format!("Failed to stat ROM: {}", path.display()))?
        .len();
    let hash = hash_file_prefix(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let display_name = display_name_from_filename(&filename);

    let mut instance = GameInstance::new(
        file_instance_id(&hash),
        emulated_game_id(platform, &display_name),
        SOURCE_EMULATED,
        platform,
        hash.clone(),
        display_name,
    );
    instance.path = Some(path.to_path_buf());
    instance.install_path = Some(path.to_path_buf());
    instance.filename = filename;
    instance.file_size = file_size;
    instance.file_hash = Some(hash);
    Ok(instance)
}

/// Walk every platform directory under `roms_dir`.
///
/// Unreadable entries are logged and skipped so one bad file doesn't hide
/// the rest of the library.
pub fn scan_roms(roms_dir: &Path) -> Vec<GameInstance> {
    let mut instances = Vec::new();
    for spec in PLATFORMS.iter().filter(|p| !p.extensions.is_empty()) {
        let dir = roms_dir.join(spec.id);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_rom_file(entry.path(), spec) {
                continue;
            }
            match rom_instance(entry.path(), spec.id) {
                Ok(instance) => instances.push(instance),
                Err(e) => tracing::warn!("Skipping ROM {}: {:#}", entry.path().display(), e),
            }
        }
    }
    instances
}

#[async_trait]
impl GameSource for EmulatedSource {
    fn name(&self) -> &str {
        SOURCE_EMULATED
    }

    async fn scan(&self) -> Result<Vec<GameInstance>> {
        let roms_dir = self.roms_dir.clone();
        let mut instances = tokio::task::spawn_blocking(move || scan_roms(&roms_dir))
            .await
            .context("ROM scan task failed")?;
        for instance in &mut instances {
            self.mark_availability(instance);
        }
        tracing::info!(
            "Found {} ROMs under {}",
            instances.len(),
            self.roms_dir.display()
        );
        Ok(instances)
    }

    async fn launch(&self, instance: &GameInstance) -> Result<LaunchedProcess, LaunchError> {
        let path = instance
            .path
            .as_ref()
            .ok_or_else(|| LaunchError::MissingPath(instance.id.clone()))?;
        let rom_path = std::path::absolute(path).unwrap_or_else(|_| path.clone());

        let pair = self.engine.resolve(&instance.platform, Some(&instance.id))?;
        tracing::info!(
            instance_id = %instance.id,
            "Resolved {} ({}) for {}",
            pair.emulator.name,
            pair.core.as_ref().map(|c| c.name.as_str()).unwrap_or("standalone"),
            instance.platform
        );

        let custom_args = self
            .engine
            .instance_override(&instance.id)?
            .map(|ov| ov.custom_args)
            .unwrap_or_default();
        let argv =
            self.engine
                .build_command(&pair.emulator, pair.core.as_ref(), &rom_path, &custom_args)?;

        let child = spawn_checked(&argv, self.settle).await?;
        tracing::info!(instance_id = %instance.id, "Emulator started (pid {:?})", child.id());
        Ok(LaunchedProcess::Child(child))
    }

    fn monitor_strategy(&self, _instance: &GameInstance) -> MonitorStrategy {
        MonitorStrategy::DirectWait
    }
}
