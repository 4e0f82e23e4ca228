//! IGDB metadata resolver

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use romshelf_core::Resolver;
use romshelf_shared::{
    FetchRequest, GameMetadata, PlatformMetadata, ResolvedMetadata, SOURCE_EMULATED,
    platform_by_id,
};

use super::client::{IgdbClient, IgdbImage, LOGO_BLACK, LOGO_COLOR, LOGO_WHITE};

pub const IGDB_RESOLVER: &str = "igdb";

/// Looks emulated titles up on IGDB by name and platform.
pub struct IgdbResolver {
    client: IgdbClient,
}

impl IgdbResolver {
    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        Ok(Self {
            client: IgdbClient::new(client_id, client_secret)?,
        })
    }
}

fn igdb_platform_id(platform: &str) -> Option<u32> {
    platform_by_id(&platform.to_ascii_lowercase()).and_then(|p| p.igdb_id)
}

#[async_trait]
impl Resolver for IgdbResolver {
    fn name(&self) -> &str {
        IGDB_RESOLVER
    }

    fn supports(&self, source: &str, platform: &str) -> bool {
        source == SOURCE_EMULATED && igdb_platform_id(platform).is_some()
    }

    async fn resolve(&self, request: &FetchRequest) -> Result<ResolvedMetadata> {
        let platform_id = igdb_platform_id(&request.platform)
            .with_context(|| format!("Unsupported platform: {}", request.platform))?;

        tracing::info!(
            instance_id = %request.instance_id,
            "Searching IGDB for '{}' on {} ({})",
            request.name,
            request.platform,
            platform_id
        );
        let game = self
            .client
            .search_game(&request.name, platform_id)
            .await
            .context("Failed to search game")?;
        tracing::info!("Found IGDB game {}: {}", game.id, game.name);

        let mut genres = Vec::new();
        match self.client.genres(&game.genres).await {
            Ok(found) => genres.extend(found.into_iter().map(|g| g.name)),
            Err(e) => tracing::warn!("Failed to fetch genres: {:#}", e),
        }

        let mut art_urls = BTreeMap::new();

        if let Some(cover_id) = game.cover {
            match self.client.cover(cover_id).await {
                Ok(Some(cover)) if !cover.url.is_empty() => {
                    art_urls.insert("cover".to_string(), expand_image_url(&cover.url));
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to fetch cover: {:#}", e),
            }
        }

        if !game.screenshots.is_empty() {
            match self.client.screenshots(game.id).await {
                Ok(shots) => {
                    if let Some(first) = shots.first() {
                        art_urls.insert("screenshot".to_string(), expand_image_url(&first.url));
                    }
                }
                Err(e) => tracing::warn!("Failed to fetch screenshots: {:#}", e),
            }
        }

        if !game.artworks.is_empty() {
            match self.client.artworks(game.id).await {
                Ok(artworks) => {
                    if let Some(first) = artworks.first() {
                        art_urls.insert("artwork".to_string(), expand_image_url(&first.url));
                    }
                }
                Err(e) => tracing::warn!("Failed to fetch artworks: {:#}", e),
            }
        }

        match self.client.logos(game.id).await {
            Ok(logos) => {
                if let Some(logo) = pick_logo(&logos) {
                    art_urls.insert("logo".to_string(), expand_image_url(&logo.url));
                }
            }
            Err(e) => tracing::warn!("Failed to fetch logos: {:#}", e),
        }

        let mut platforms = BTreeMap::new();
        platforms.insert(
            request.platform.clone(),
            PlatformMetadata {
                platform: request.platform.clone(),
                ..Default::default()
            },
        );

        tracing::info!(
            "Resolved '{}' from IGDB: {} genres, {} images",
            game.name,
            genres.len(),
            art_urls.len()
        );

        Ok(ResolvedMetadata {
            game: GameMetadata {
                name: game.name,
                description: game.summary,
                release_date: game
                    .first_release_date
                    .filter(|ts| *ts > 0)
                    .and_then(|ts| DateTime::from_timestamp(ts, 0)),
                genres,
                ..Default::default()
            },
            platforms,
            art_urls,
        })
    }
}

/// Color logo, else white, else black.
fn pick_logo(logos: &[IgdbImage]) -> Option<&IgdbImage> {
    [LOGO_COLOR, LOGO_WHITE, LOGO_BLACK].iter().find_map(|kind| {
        logos
            .iter()
            .find(|l| l.artwork_type == Some(*kind) && !l.url.is_empty())
    })
}

/// IGDB hands out protocol-relative thumbnail URLs; ask for the 720p PNG.
pub fn expand_image_url(url: &str) -> String {
    let url = match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    };
    let url = url.replacen("t_thumb", "t_720p", 1);
    match url.strip_suffix(".jpg") {
        Some(stem) => format!("{stem}.png"),
        None => url,
    }
}
