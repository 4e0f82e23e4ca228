//! Library service
//!
//! Ties sources, the metadata fetcher, the emulator engine and the launcher
//! to the store. Everything user-visible is reported through the event sink.

use std::sync::Arc;

use anyhow::{Context, Result};
use romshelf_core::config::Config;
use romshelf_core::emulator::EmulatorEngine;
use romshelf_core::launch::{GameSource, LaunchError, Launcher, ProcessProbe, SourceRegistry};
use romshelf_core::metadata::{CACHE_RESOLVER, CacheResolver, FetchCallback, Fetcher, Resolver};
use romshelf_core::{EventSink, LibraryStore, SysinfoProbe, SystemProbe};
use romshelf_shared::{
    Emulator, EmulatorCore, FetchRequest, Game, GameInstance, GameMetadata, InstanceOverride,
    MetadataStatus, MetadataStatusUpdate, PlatformEmulator, ResolvedMetadata,
};

use crate::igdb::IgdbResolver;
use crate::query::{GameFilter, GameSort, LibraryEntry};
use crate::sources::{EmulatedSource, SteamSource};

/// Priority given to fetches queued by a refresh.
const REFRESH_PRIORITY: i32 = 1;

/// Status message marking metadata the user wrote by hand.
const USER_EDITED: &str = "User edited";

/// What a refresh changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub scanned: usize,
    pub added: usize,
    pub updated: usize,
    pub queued: usize,
}

pub struct LibraryService {
    store: Arc<dyn LibraryStore>,
    sink: Arc<dyn EventSink>,
    sources: Arc<SourceRegistry>,
    engine: Arc<EmulatorEngine>,
    fetcher: Fetcher,
    launcher: Launcher,
}

impl LibraryService {
    /// Build the service with the host probes and the sources enabled in `config`.
    ///
    /// IGDB is registered only when credentials are configured.
    pub fn new(config: &Config, store: Arc<dyn LibraryStore>, sink: Arc<dyn EventSink>) -> Result<Self> {
        let engine = Arc::new(EmulatorEngine::new(
            &config.emulators,
            Arc::clone(&store),
            Arc::clone(&sink),
            Arc::new(SystemProbe),
        ));

        let mut sources = SourceRegistry::new();
        if config.sources.emulated.enabled {
            sources.register(Box::new(EmulatedSource::new(
                config.sources.emulated.roms_dir.clone(),
                Arc::clone(&engine),
                config.launch.settle(),
            )));
        }
        if config.sources.steam.enabled {
            sources.register(Box::new(SteamSource::new(
                config.sources.steam.install_dir.clone(),
            )));
        }

        let service = Self::with_parts(
            config,
            store,
            sink,
            engine,
            sources,
            Arc::new(SysinfoProbe::new()),
        );

        match config.igdb.credentials() {
            Some((client_id, client_secret)) => {
                let igdb = IgdbResolver::new(client_id, client_secret)
                    .context("Failed to set up IGDB resolver")?;
                service.register_resolver(Arc::new(igdb));
            }
            None => tracing::warn!(
                "IGDB credentials not configured, metadata will only come from the cache"
            ),
        }

        Ok(service)
    }

    /// Build the service from prepared parts. Only the cache resolver is
    /// registered; add others with [`Self::register_resolver`] before [`Self::start`].
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn LibraryStore>,
        sink: Arc<dyn EventSink>,
        engine: Arc<EmulatorEngine>,
        sources: SourceRegistry,
        process_probe: Arc<dyn ProcessProbe>,
    ) -> Self {
        let sources = Arc::new(sources);
        let fetcher = Fetcher::new(
            &config.fetcher,
            Arc::clone(&sink),
            resolved_callback(Arc::clone(&store), Arc::clone(&sink)),
        );
        fetcher.register_resolver(Arc::new(CacheResolver::new(Arc::clone(&store))));

        let launcher = Launcher::new(
            config.launch.clone(),
            Arc::clone(&store),
            Arc::clone(&sources),
            Arc::clone(&sink),
            process_probe,
        );

        Self {
            store,
            sink,
            sources,
            engine,
            fetcher,
            launcher,
        }
    }

    pub fn register_resolver(&self, resolver: Arc<dyn Resolver>) {
        self.fetcher.register_resolver(resolver);
    }

    /// Seed the emulator catalog, probe the host and start the fetch workers.
    pub async fn start(&self) -> Result<()> {
        self.engine
            .initialize()
            .context("Failed to seed emulator catalog")?;
        self.engine
            .discover()
            .await
            .context("Emulator discovery failed")?;
        self.fetcher.start();
        Ok(())
    }

    /// Stop the fetch workers and every launch monitor.
    pub async fn shutdown(&self) {
        self.fetcher.stop().await;
        self.launcher.shutdown();
        tracing::info!("Library service stopped");
    }

    pub fn store(&self) -> &Arc<dyn LibraryStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<EmulatorEngine> {
        &self.engine
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.names()
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Rescan every source.
    ///
    /// A source that fails to scan is logged and skipped.
    pub async fn refresh(&self) -> Result<RefreshSummary> {
        tracing::info!("Refreshing games from all sources");
        let mut summary = RefreshSummary::default();
        for source in self.sources.sources() {
            if let Err(e) = self.refresh_from(source.as_ref(), &mut summary).await {
                tracing::warn!("Scan of {} failed: {:#}", source.name(), e);
            }
        }
        tracing::info!(
            "Refresh done: {} scanned, {} new, {} updated, {} queued",
            summary.scanned,
            summary.added,
            summary.updated,
            summary.queued
        );
        Ok(summary)
    }

    /// Rescan one source by name.
    pub async fn refresh_source(&self, name: &str) -> Result<RefreshSummary> {
        let source = self
            .sources
            .find(name)
            .with_context(|| format!("Source not found: {}", name))?;
        let mut summary = RefreshSummary::default();
        self.refresh_from(source, &mut summary).await?;
        Ok(summary)
    }

    /// Merge an instance built outside a scan, e.g. a ROM added by path.
    pub async fn import(&self, instance: GameInstance) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary {
            scanned: 1,
            ..Default::default()
        };
        self.merge_instance(instance, &mut summary).await?;
        Ok(summary)
    }

    async fn refresh_from(&self, source: &dyn GameSource, summary: &mut RefreshSummary) -> Result<()> {
        let scanned = source.scan().await?;
        summary.scanned += scanned.len();
        for instance in scanned {
            self.merge_instance(instance, summary).await?;
        }
        Ok(())
    }

    async fn merge_instance(&self, scanned: GameInstance, summary: &mut RefreshSummary) -> Result<()> {
        match self.store.get_instance(&scanned.id)? {
            None => {
                if self.store.get_game(&scanned.game_id)?.is_none() {
                    let game = Game::placeholder(
                        scanned.game_id.clone(),
                        scanned.display_name.clone(),
                        &scanned.platform,
                    );
                    self.store.upsert_game(&game)?;
                }
                self.store.upsert_instance(&scanned)?;
                tracing::debug!(instance_id = %scanned.id, "New instance: {}", scanned.display_name);
                summary.added += 1;
                if self.queue_metadata_fetch(&scanned).await? {
                    summary.queued += 1;
                }
            }
            Some(mut existing) => {
                if existing.merge_scanned(&scanned) {
                    self.store.upsert_instance(&existing)?;
                    tracing::debug!(instance_id = %existing.id, "Updated instance");
                    summary.updated += 1;
                }
                if !existing.metadata_status.is_completed()
                    && self.queue_metadata_fetch(&existing).await?
                {
                    summary.queued += 1;
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Apply cached metadata if there is any, otherwise queue a fetch.
    ///
    /// Returns `true` when a fetch was queued. A rejected enqueue is reported
    /// as an error status, not returned.
    pub async fn queue_metadata_fetch(&self, instance: &GameInstance) -> Result<bool> {
        if let Some((resolver, cached)) = self.store.cached_metadata(&instance.game_id)? {
            tracing::debug!(
                instance_id = %instance.id,
                "Using metadata cached from {}",
                resolver
            );
            if let Some(mut game) = self.store.get_game(&instance.game_id)? {
                game.apply_metadata(&cached);
                self.store.upsert_game(&game)?;
            }
            self.set_status(instance, MetadataStatus::completed("Using cached metadata"))?;
            return Ok(false);
        }

        self.set_status(instance, MetadataStatus::fetching("Fetching metadata"))?;
        match self
            .fetcher
            .queue(FetchRequest::for_instance(instance, REFRESH_PRIORITY))
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(instance_id = %instance.id, "Could not queue metadata fetch: {}", e);
                self.set_status(instance, MetadataStatus::failed(e.to_string()))?;
                Ok(false)
            }
        }
    }

    fn set_status(&self, instance: &GameInstance, status: MetadataStatus) -> Result<()> {
        self.store.set_metadata_status(&instance.id, &status)?;
        self.sink.metadata_status_changed(MetadataStatusUpdate {
            instance_id: instance.id.clone(),
            game_id: instance.game_id.clone(),
            status,
        });
        Ok(())
    }

    /// Apply user edits to an instance's game. Any in-flight fetch is dropped
    /// so it can't overwrite the edit.
    pub fn update_metadata(&self, instance_id: &str, edits: &GameMetadata) -> Result<()> {
        self.fetcher.cancel(instance_id);

        let instance = self
            .store
            .get_instance(instance_id)?
            .with_context(|| format!("Instance not found: {}", instance_id))?;
        let mut game = self
            .store
            .get_game(&instance.game_id)?
            .with_context(|| format!("Game not found: {}", instance.game_id))?;

        game.apply_metadata(&ResolvedMetadata {
            game: edits.clone(),
            ..Default::default()
        });
        self.store.upsert_game(&game)?;
        self.set_status(&instance, MetadataStatus::completed(USER_EDITED))
    }

    /// Cancel an in-flight fetch. Returns whether one was running.
    pub fn cancel_metadata_fetch(&self, instance_id: &str) -> Result<bool> {
        if !self.fetcher.cancel(instance_id) {
            return Ok(false);
        }
        if let Some(instance) = self.store.get_instance(instance_id)? {
            self.set_status(&instance, MetadataStatus::cancelled())?;
        }
        Ok(true)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn list(&self, filter: &GameFilter, sort: GameSort) -> Result<Vec<LibraryEntry>> {
        let mut entries = Vec::new();
        for instance in self.store.list_instances()? {
            let game = match self.store.get_game(&instance.game_id)? {
                Some(game) => game,
                None => Game::placeholder(
                    instance.game_id.clone(),
                    instance.display_name.clone(),
                    &instance.platform,
                ),
            };
            let entry = LibraryEntry { game, instance };
            if filter.matches(&entry) {
                entries.push(entry);
            }
        }
        sort.apply(&mut entries);
        Ok(entries)
    }

    /// A game and all of its instances.
    pub fn game(&self, game_id: &str) -> Result<Option<(Game, Vec<GameInstance>)>> {
        let Some(game) = self.store.get_game(game_id)? else {
            return Ok(None);
        };
        let instances = self
            .store
            .list_instances()?
            .into_iter()
            .filter(|i| i.game_id == game_id)
            .collect();
        Ok(Some((game, instances)))
    }

    // =========================================================================
    // Launching and emulator settings
    // =========================================================================

    pub async fn launch(&self, instance_id: &str) -> Result<(), LaunchError> {
        self.launcher.launch(instance_id).await
    }

    pub fn emulators(&self) -> Result<Vec<Emulator>> {
        Ok(self.engine.emulators()?)
    }

    pub fn emulators_for_platform(
        &self,
        platform: &str,
    ) -> Result<Vec<(PlatformEmulator, Emulator, Option<EmulatorCore>)>> {
        Ok(self.engine.emulators_for_platform(platform)?)
    }

    pub fn set_platform_default(
        &self,
        platform: &str,
        emulator_id: &str,
        core_id: Option<&str>,
    ) -> Result<()> {
        Ok(self
            .engine
            .set_platform_default(platform, emulator_id, core_id)?)
    }

    pub fn set_instance_emulator(&self, ov: &InstanceOverride) -> Result<()> {
        Ok(self.engine.set_instance_override(ov)?)
    }

    /// Re-probe the host for emulators and cores.
    pub async fn refresh_emulators(&self) -> Result<()> {
        Ok(self.engine.discover().await?)
    }
}

/// Fetch callback: update the game, cache what the resolver found and mark
/// the instance completed.
fn resolved_callback(store: Arc<dyn LibraryStore>, sink: Arc<dyn EventSink>) -> FetchCallback {
    Arc::new(move |request: &FetchRequest, metadata: ResolvedMetadata, resolver: &str| {
        if let Err(e) = apply_resolved(store.as_ref(), sink.as_ref(), request, &metadata, resolver) {
            tracing::error!(
                instance_id = %request.instance_id,
                "Failed to store resolved metadata: {}",
                e
            );
        }
    })
}

fn apply_resolved(
    store: &dyn LibraryStore,
    sink: &dyn EventSink,
    request: &FetchRequest,
    metadata: &ResolvedMetadata,
    resolver: &str,
) -> Result<()> {
    // A fetch that finished just before an edit cancelled it
    if let Some(instance) = store.get_instance(&request.instance_id)?
        && instance.metadata_status.is_completed()
        && instance.metadata_status.message.as_deref() == Some(USER_EDITED)
    {
        tracing::debug!(
            instance_id = %request.instance_id,
            "Dropping metadata from {}, user edits win",
            resolver
        );
        return Ok(());
    }

    let mut game = store
        .get_game(&request.game_id)?
        .with_context(|| format!("Game not found: {}", request.game_id))?;
    game.apply_metadata(metadata);
    store.upsert_game(&game)?;

    if resolver != CACHE_RESOLVER
        && let Err(e) = store.cache_metadata(&request.game_id, resolver, metadata)
    {
        tracing::warn!("Failed to cache metadata for {}: {}", request.game_id, e);
    }

    let status = MetadataStatus::completed(format!("Resolved from {}", resolver));
    store.set_metadata_status(&request.instance_id, &status)?;
    sink.metadata_status_changed(MetadataStatusUpdate {
        instance_id: request.instance_id.clone(),
        game_id: request.game_id.clone(),
        status,
    });
    tracing::info!(instance_id = %request.instance_id, "Metadata resolved from {}", resolver);
    Ok(())
}
