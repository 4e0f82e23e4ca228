//! romshelf core - metadata pipeline and launch engine
//!
//! This crate holds the moving parts behind the library service: the
//! background metadata fetcher, the emulator catalog and resolver, and the
//! launcher that starts games and watches them until they exit.
//!
//! # Architecture
//!
//! - [`Fetcher`] - bounded worker pool running a chain of [`Resolver`]s
//! - [`EmulatorEngine`] - emulator discovery, resolution and command building
//! - [`Launcher`] - routes launches to a [`GameSource`] and monitors the result
//! - [`LibraryStore`] - persistence seam, with [`MemoryStore`] for in-process use
//! - [`EventSink`] - status notifications for whatever UI sits on top

pub mod config;
pub mod emulator;
pub mod events;
pub mod launch;
pub mod metadata;
pub mod store;
mod sync;
#[cfg(test)]
pub mod test_utils;

pub use config::Config;
pub use emulator::{EmulatorEngine, EmulatorError, HostProbe, SystemProbe};
pub use events::{ChannelSink, Event, EventSink, LogSink, NoopSink};
pub use launch::{
    GameSource, LaunchError, LaunchedProcess, Launcher, MonitorStrategy, ProcessProbe,
    SourceRegistry, SysinfoProbe,
};
pub use metadata::{CacheResolver, FetchError, Fetcher, Resolver};
pub use store::{LibraryStore, MemoryStore, StoreError};
