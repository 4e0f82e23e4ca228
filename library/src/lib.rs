//! romshelf library
//!
//! The game library service and its concrete collaborators:
//! - [`sources`] - local ROMs and installed Steam games
//! - [`igdb`] - IGDB metadata resolver
//! - [`service::LibraryService`] - scanning, metadata, launching and emulator settings
//! - [`query`] - listing filters and sort orders

pub mod igdb;
pub mod query;
pub mod service;
pub mod sources;

pub use query::{GameFilter, GameSort, LibraryEntry, SortField};
pub use service::{LibraryService, RefreshSummary};
