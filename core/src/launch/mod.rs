//! Launching games and tracking them until they exit.
//!
//! A [`GameSource`] knows how to start its own instances; the [`Launcher`]
//! routes a launch to the right source, reports status through the event
//! sink and picks a monitor based on the source's [`MonitorStrategy`].

mod launcher;
mod monitor;
mod process;
mod source;

pub use launcher::Launcher;
pub use monitor::{ActivityTiming, ProcessProbe, SysinfoProbe, normalize_wine_path};
pub use process::{RunningChild, STDERR_TAIL_BYTES, StderrTail, display_command, spawn_checked};
pub use source::{GameSource, LaunchedProcess, MonitorStrategy, SourceRegistry};

use thiserror::Error;

use crate::emulator::EmulatorError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("unknown instance: {0}")]
    UnknownInstance(String),
    #[error("no game source named {0}")]
    UnknownSource(String),
    #[error("instance {0} has no file path")]
    MissingPath(String),
    #[error("launch command is empty")]
    EmptyCommand,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process exited immediately ({status}){}", stderr_suffix(.stderr))]
    ExitedImmediately { status: String, stderr: String },
    #[error(transparent)]
    Emulator(#[from] EmulatorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
