//! Launch orchestration.

use std::sync::Arc;

use romshelf_shared::{GameInstance, LaunchStatus};
use tokio_util::sync::CancellationToken;

use super::LaunchError;
use super::monitor::{ActivityTiming, ProcessProbe, Reporter, watch_activity, watch_child};
use super::source::{LaunchedProcess, MonitorStrategy, SourceRegistry};
use crate::config::LaunchConfig;
use crate::events::EventSink;
use crate::store::LibraryStore;

/// Starts instances through their source and watches them until they stop.
///
/// Every accepted launch reports `Launching` first, then exactly one of
/// `Failed` or `Running`, and `Stopped` when the game exits.
pub struct Launcher {
    store: Arc<dyn LibraryStore>,
    sources: Arc<SourceRegistry>,
    sink: Arc<dyn EventSink>,
    probe: Arc<dyn ProcessProbe>,
    config: LaunchConfig,
    shutdown: CancellationToken,
}

impl Launcher {
    pub fn new(
        config: LaunchConfig,
        store: Arc<dyn LibraryStore>,
        sources: Arc<SourceRegistry>,
        sink: Arc<dyn EventSink>,
        probe: Arc<dyn ProcessProbe>,
    ) -> Self {
        Self {
            store,
            sources,
            sink,
            probe,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Launch an instance by id.
    ///
    /// Unknown instances are rejected without any status event. Everything
    /// after `Launching` that goes wrong is both reported as `Failed` and
    /// returned.
    pub async fn launch(&self, instance_id: &str) -> Result<(), LaunchError> {
        let Some(instance) = self.store.get_instance(instance_id)? else {
            return Err(LaunchError::UnknownInstance(instance_id.to_string()));
        };

        let reporter = Reporter {
            instance_id: instance.id.clone(),
            game_id: instance.game_id.clone(),
            sink: Arc::clone(&self.sink),
        };
        reporter.emit(LaunchStatus::Launching);

        match self.start(&instance, &reporter).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(instance_id = %instance.id, "Launch failed: {}", e);
                reporter.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn start(&self, instance: &GameInstance, reporter: &Reporter) -> Result<(), LaunchError> {
        let source = self
            .sources
            .find(&instance.source)
            .ok_or_else(|| LaunchError::UnknownSource(instance.source.clone()))?;

        let strategy = source.monitor_strategy(instance);
        let launched = source.launch(instance).await?;

        match (strategy, launched) {
            (MonitorStrategy::DirectWait, LaunchedProcess::Child(child)) => {
                reporter.emit(LaunchStatus::Running);
                tokio::spawn(watch_child(child, reporter.clone(), self.shutdown.clone()));
            }
            (MonitorStrategy::DirectWait, LaunchedProcess::Detached) => {
                tracing::warn!(
                    instance_id = %instance.id,
                    "Source {} returned no process to wait on",
                    instance.source
                );
                reporter.emit(LaunchStatus::Running);
            }
            (MonitorStrategy::Activity { install_path }, launched) => {
                // The trampoline's own lifetime says nothing about the game
                if let LaunchedProcess::Child(child) = launched {
                    tracing::debug!(instance_id = %instance.id, "Ignoring launcher pid {:?}", child.id());
                }
                tokio::spawn(watch_activity(
                    Arc::clone(&self.probe),
                    install_path,
                    self.timing(),
                    reporter.clone(),
                    self.shutdown.clone(),
                ));
            }
        }
        Ok(())
    }

    fn timing(&self) -> ActivityTiming {
        ActivityTiming {
            poll_interval: self.config.poll_interval(),
            stop_debounce: self.config.stop_debounce(),
            detect_timeout: self.config.detect_timeout(),
        }
    }

    /// Stop every monitor. Running games are left alone.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
