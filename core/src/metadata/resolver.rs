//! Resolver trait and the store-backed cache resolver.

use std::sync::Arc;

use async_trait::async_trait;
use romshelf_shared::{FetchRequest, ResolvedMetadata};

use crate::store::LibraryStore;

/// A metadata catalog.
///
/// Resolvers run in registration order; the first success wins. An `Err`
/// only moves the chain on to the next resolver.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Name recorded in `sources_tried` and in the external metadata cache.
    fn name(&self) -> &str;

    /// Whether this resolver should be asked about content from `source` on `platform`.
    fn supports(&self, source: &str, platform: &str) -> bool;

    async fn resolve(&self, request: &FetchRequest) -> anyhow::Result<ResolvedMetadata>;
}

pub const CACHE_RESOLVER: &str = "cache";

/// Answers from metadata a network resolver produced earlier for the same game.
pub struct CacheResolver {
    store: Arc<dyn LibraryStore>,
}

impl CacheResolver {
    pub fn new(store: Arc<dyn LibraryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Resolver for CacheResolver {
    fn name(&self) -> &str {
        CACHE_RESOLVER
    }

    fn supports(&self, _source: &str, _platform: &str) -> bool {
        true
    }

    async fn resolve(&self, request: &FetchRequest) -> anyhow::Result<ResolvedMetadata> {
        match self.store.cached_metadata(&request.game_id)? {
            Some((origin, metadata)) => {
                tracing::debug!(game_id = %request.game_id, "cache hit from {}", origin);
                Ok(metadata)
            }
            None => anyhow::bail!("no cached metadata for {}", request.game_id),
        }
    }
}
