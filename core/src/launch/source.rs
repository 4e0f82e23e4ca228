//! Game sources and their registry.

use std::path::PathBuf;

use async_trait::async_trait;
use romshelf_shared::GameInstance;

use super::LaunchError;
use super::process::RunningChild;

/// How a launched game is tracked until it exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorStrategy {
    /// Wait on the spawned child; it *is* the game.
    DirectWait,
    /// The spawned program hands off to another process (e.g. a protocol
    /// handler). Poll the process table for anything under `install_path`.
    Activity { install_path: PathBuf },
}

/// What a source hands back after starting a game.
#[derive(Debug)]
pub enum LaunchedProcess {
    /// A child process we own and can wait on.
    Child(RunningChild),
    /// Handed off to another program; nothing to wait on.
    Detached,
}

/// A provider of game instances that knows how to start them.
///
/// Each source (emulated ROMs, a storefront client, ...) implements this
/// trait. The library service scans every registered source on refresh and
/// routes launches by [`GameInstance::source`].
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Source identifier, matching `GameInstance::source`.
    fn name(&self) -> &str;

    /// Discover every instance this source currently provides.
    async fn scan(&self) -> anyhow::Result<Vec<GameInstance>>;

    /// Start the instance.
    ///
    /// Implementations that spawn a child should return only once it has
    /// survived the liveness probe (see [`super::spawn_checked`]).
    async fn launch(&self, instance: &GameInstance) -> Result<LaunchedProcess, LaunchError>;

    /// How to monitor a launched instance.
    fn monitor_strategy(&self, instance: &GameInstance) -> MonitorStrategy;
}

/// Registry of game sources, in registration order.
pub struct SourceRegistry {
    sources: Vec<Box<dyn GameSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Box<dyn GameSource>) {
        tracing::info!("Registered game source: {}", source.name());
        self.sources.push(source);
    }

    pub fn find(&self, name: &str) -> Option<&dyn GameSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn sources(&self) -> &[Box<dyn GameSource>] {
        &self.sources
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
