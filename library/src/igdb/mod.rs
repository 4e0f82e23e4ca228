//! IGDB metadata lookup

mod client;
mod resolver;

pub use client::{IgdbClient, IgdbGame, IgdbGenre, IgdbImage};
pub use resolver::{IGDB_RESOLVER, IgdbResolver, expand_image_url};
