//! Tracking a launched game until it stops.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use romshelf_shared::{LaunchStatus, LaunchStatusUpdate};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::process::RunningChild;
use crate::events::EventSink;
use crate::sync::lock;

/// Looks for running processes that belong to an install directory.
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn running_under(&self, install_path: &Path) -> bool;
}

/// [`ProcessProbe`] over the host process table.
///
/// A process matches when its executable lives under the install path, or
/// when its command line mentions it (Wine/Proton games show up with
/// `Z:\home\...` style paths, see [`normalize_wine_path`]).
pub struct SysinfoProbe {
    system: Arc<Mutex<System>>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessProbe for SysinfoProbe {
    async fn running_under(&self, install_path: &Path) -> bool {
        let system = Arc::clone(&self.system);
        let install_path = install_path.to_path_buf();
        let scan = tokio::task::spawn_blocking(move || {
            let mut system = lock(&system);
            system.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing()
                    .with_exe(UpdateKind::OnlyIfNotSet)
                    .with_cmd(UpdateKind::OnlyIfNotSet),
            );
            let needle = install_path.to_string_lossy().into_owned();
            system.processes().values().any(|process| {
                if process.exe().is_some_and(|exe| exe.starts_with(&install_path)) {
                    return true;
                }
                let cmdline = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                normalize_wine_path(&cmdline).contains(&needle)
            })
        });
        match scan.await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Process scan failed: {}", e);
                false
            }
        }
    }
}

/// Turn a Windows-style path from a Wine command line into a host path:
/// drop a leading drive letter and flip backslashes.
pub fn normalize_wine_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let stripped = if bytes.len() > 2 && bytes[1] == b':' {
        &path[2..]
    } else {
        path
    };
    stripped.replace('\\', "/")
}

/// Identity and destination of the status updates for one launch.
#[derive(Clone)]
pub(crate) struct Reporter {
    pub instance_id: String,
    pub game_id: String,
    pub sink: Arc<dyn EventSink>,
}

impl Reporter {
    pub fn emit(&self, status: LaunchStatus) {
        self.sink.launch_status_changed(LaunchStatusUpdate::new(
            &self.instance_id,
            &self.game_id,
            status,
        ));
    }

    pub fn fail(&self, error: impl Into<String>) {
        self.sink.launch_status_changed(LaunchStatusUpdate::failed(
            &self.instance_id,
            &self.game_id,
            error,
        ));
    }
}

/// Wait for a directly spawned game to exit.
///
/// Shutdown stops watching without emitting; the child is left running.
pub(crate) async fn watch_child(
    mut child: RunningChild,
    reporter: Reporter,
    shutdown: CancellationToken,
) {
    tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::debug!(instance_id = %reporter.instance_id, "Stopped watching child on shutdown");
        }
        status = child.wait() => {
            match status {
                Ok(status) => tracing::info!(
                    instance_id = %reporter.instance_id,
                    "Game exited: {}",
                    status
                ),
                Err(e) => tracing::warn!(
                    instance_id = %reporter.instance_id,
                    "Waiting on game failed: {}",
                    e
                ),
            }
            reporter.emit(LaunchStatus::Stopped);
        }
    }
}

/// Timing for activity-based monitoring.
#[derive(Debug, Clone, Copy)]
pub struct ActivityTiming {
    pub poll_interval: Duration,
    pub stop_debounce: Duration,
    pub detect_timeout: Duration,
}

/// Poll for processes under `install_path`.
///
/// Emits `Running` on first detection and `Stopped` once nothing has been
/// seen for longer than the debounce window. If nothing shows up within the
/// detect timeout the launch is reported `Failed`.
pub(crate) async fn watch_activity(
    probe: Arc<dyn ProcessProbe>,
    install_path: PathBuf,
    timing: ActivityTiming,
    reporter: Reporter,
    shutdown: CancellationToken,
) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval_at(start + timing.poll_interval, timing.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_seen: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(instance_id = %reporter.instance_id, "Activity monitor shut down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        if probe.running_under(&install_path).await {
            if last_seen.is_none() {
                tracing::info!(
                    instance_id = %reporter.instance_id,
                    "Detected game process under {}",
                    install_path.display()
                );
                reporter.emit(LaunchStatus::Running);
            }
            last_seen = Some(now);
            continue;
        }

        match last_seen {
            Some(seen) if now.duration_since(seen) > timing.stop_debounce => {
                tracing::info!(instance_id = %reporter.instance_id, "Game processes gone");
                reporter.emit(LaunchStatus::Stopped);
                return;
            }
            Some(_) => {}
            None if now.duration_since(start) > timing.detect_timeout => {
                tracing::warn!(
                    instance_id = %reporter.instance_id,
                    "No game process appeared under {}",
                    install_path.display()
                );
                reporter.fail(format!(
                    "game process not detected within {}s",
                    timing.detect_timeout.as_secs()
                ));
                return;
            }
            None => {}
        }
    }
}
